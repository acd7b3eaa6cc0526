//! Funnel join: attaches cohort and resolved segment to each onboarding
//! user and drops users without a segment.

use onboarding_core::types::{
    AbGroup, CohortAssignment, FunnelRecord, OnboardingRecord, ResolvedSegment,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Row counts around the segment filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterAudit {
    pub before: usize,
    pub after: usize,
    pub filtered_out: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FunnelJoin {
    pub records: Vec<FunnelRecord>,
    pub audit: FilterAudit,
    /// Surviving users per segment code.
    pub segment_distribution: BTreeMap<i32, usize>,
}

/// Left-join onboarding to segments, then keep only users with a segment.
///
/// `drop` is 1 exactly when `return` is 0; a missing `return` is not a drop.
/// Missing `activacion`/`setup` flags count as 0. Users missing from
/// `cohorts` fall back to treatment, which cannot happen when the
/// assignments come from the same onboarding rows.
pub fn join_funnel(
    onboarding: &[OnboardingRecord],
    cohorts: &[CohortAssignment],
    segments: &[ResolvedSegment],
) -> FunnelJoin {
    let segment_by_user: HashMap<&str, i32> = segments
        .iter()
        .map(|s| (s.user_id.as_str(), s.segment))
        .collect();
    let group_by_user: HashMap<&str, AbGroup> = cohorts
        .iter()
        .map(|c| (c.user_id.as_str(), c.ab_group))
        .collect();

    let before = onboarding.len();
    let mut records: Vec<FunnelRecord> = onboarding
        .iter()
        .filter_map(|row| {
            let segment = *segment_by_user.get(row.user_id.as_str())?;
            let ab_group = group_by_user
                .get(row.user_id.as_str())
                .copied()
                .unwrap_or(AbGroup::Treatment);
            Some(FunnelRecord {
                user_id: row.user_id.clone(),
                segment,
                ab_group,
                first_login_dt: row.first_login_dt,
                drop: i32::from(row.returned == Some(0)),
                activacion: i32::from(row.activacion.unwrap_or(0)),
                setup: i32::from(row.setup.unwrap_or(0)),
            })
        })
        .collect();
    records.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let after = records.len();
    let audit = FilterAudit {
        before,
        after,
        filtered_out: before - after,
    };

    let mut segment_distribution = BTreeMap::new();
    for record in &records {
        *segment_distribution.entry(record.segment).or_insert(0) += 1;
    }

    info!(
        before = audit.before,
        after = audit.after,
        filtered_out = audit.filtered_out,
        "Users without segment filtered"
    );
    metrics::counter!("etl.users_filtered").increment(audit.filtered_out as u64);

    FunnelJoin {
        records,
        audit,
        segment_distribution,
    }
}

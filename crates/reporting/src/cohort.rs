//! A/B cohort analysis: per-group rates and treatment-vs-control deltas.

use crate::rates::RateSummary;
use onboarding_core::types::{AbGroup, MetricsRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohortRow {
    pub ab_group: String,
    pub rates: RateSummary,
}

/// Treatment rate minus control rate, in percentage points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohortLift {
    pub activation_diff: f64,
    pub setup_diff: f64,
    pub habit_diff: f64,
    pub drop_diff: f64,
}

/// Rates per `ab_group` value, ordered by group name. Unrecognized group
/// names get their own row rather than being discarded.
pub fn cohort_rates(records: &[MetricsRecord]) -> Vec<CohortRow> {
    let mut groups: BTreeMap<&str, Vec<&MetricsRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(r.ab_group.as_str()).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|(ab_group, rows)| CohortRow {
            ab_group: ab_group.to_string(),
            rates: RateSummary::from_records(rows),
        })
        .collect()
}

/// `None` unless both control and treatment have at least one user.
pub fn treatment_lift(rows: &[CohortRow]) -> Option<CohortLift> {
    let find = |group: AbGroup| {
        rows.iter()
            .find(|r| r.ab_group == group.as_str() && r.rates.total_users > 0)
            .map(|r| &r.rates)
    };
    let control = find(AbGroup::Control)?;
    let treatment = find(AbGroup::Treatment)?;

    Some(CohortLift {
        activation_diff: treatment.activation_rate - control.activation_rate,
        setup_diff: treatment.setup_rate - control.setup_rate,
        habit_diff: treatment.habit_rate - control.habit_rate,
        drop_diff: treatment.drop_rate - control.drop_rate,
    })
}

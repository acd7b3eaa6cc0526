//! Shared rate arithmetic for every summary view.

use onboarding_core::types::MetricsRecord;
use serde::{Deserialize, Serialize};

/// Counts and percentages over a group of metrics rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub total_users: u64,
    pub activated: u64,
    pub setup: u64,
    pub habit: u64,
    pub dropped: u64,
    pub activation_rate: f64,
    pub setup_rate: f64,
    pub habit_rate: f64,
    pub drop_rate: f64,
}

impl RateSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MetricsRecord>) -> Self {
        let mut summary = RateSummary::default();
        for r in records {
            summary.total_users += 1;
            summary.activated += u64::from(r.activacion == 1);
            summary.setup += u64::from(r.setup == 1);
            summary.habit += u64::from(r.habito_calc == 1);
            summary.dropped += u64::from(r.drop == 1);
        }
        summary.activation_rate = percent(summary.activated, summary.total_users);
        summary.setup_rate = percent(summary.setup, summary.total_users);
        summary.habit_rate = percent(summary.habit, summary.total_users);
        summary.drop_rate = percent(summary.dropped, summary.total_users);
        summary
    }
}

/// `part / total * 100`, or 0 for an empty group.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
pub(crate) fn record(user_id: &str, segment: i32, ab_group: &str, flags: [i32; 4]) -> MetricsRecord {
    let [drop, activacion, setup, habito_calc] = flags;
    MetricsRecord {
        user_id: user_id.to_string(),
        segment,
        ab_group: ab_group.to_string(),
        drop,
        activacion,
        setup,
        habito_calc,
    }
}

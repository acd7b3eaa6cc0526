//! Funnel analysis: registered → activated → setup → habit.

use crate::rates::{percent, RateSummary};
use onboarding_core::types::MetricsRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelResult {
    pub total_users: u64,
    pub steps: Vec<FunnelStepResult>,
    /// Share of registered users that reached the final step.
    pub overall_conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelStepResult {
    pub step_name: String,
    pub users: u64,
    /// Percentage of registered users.
    pub pct_of_registered: f64,
    /// Percentage of the previous step's users.
    pub conversion_from_previous: f64,
}

/// Onboarding funnel over the given rows. Each step counts users with the
/// milestone flag set; the steps are not required to be nested.
pub fn analyze_funnel(records: &[MetricsRecord]) -> FunnelResult {
    let summary = RateSummary::from_records(records);
    let counts = [
        ("Registered", summary.total_users),
        ("Activated", summary.activated),
        ("Setup", summary.setup),
        ("Habit", summary.habit),
    ];

    let mut steps = Vec::with_capacity(counts.len());
    let mut previous = summary.total_users;
    for (name, users) in counts {
        steps.push(FunnelStepResult {
            step_name: name.to_string(),
            users,
            pct_of_registered: percent(users, summary.total_users),
            conversion_from_previous: percent(users, previous),
        });
        previous = users;
    }

    FunnelResult {
        total_users: summary.total_users,
        overall_conversion_rate: percent(summary.habit, summary.total_users),
        steps,
    }
}

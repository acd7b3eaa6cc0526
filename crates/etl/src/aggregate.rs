//! Final per-user metrics projection.

use onboarding_core::types::{FunnelRecord, HabitRecord, MetricsRecord};
use std::collections::HashMap;

/// Left-join funnel users with their habit rows. Users without a habit row
/// get `habito_calc = 0`. Output follows the funnel order.
pub fn merge_metrics(funnel: &[FunnelRecord], habits: &[HabitRecord]) -> Vec<MetricsRecord> {
    let habit_by_user: HashMap<&str, i32> = habits
        .iter()
        .map(|h| (h.user_id.as_str(), h.habito_calc))
        .collect();

    funnel
        .iter()
        .map(|f| MetricsRecord {
            user_id: f.user_id.clone(),
            segment: f.segment,
            ab_group: f.ab_group.as_str().to_string(),
            drop: f.drop,
            activacion: f.activacion,
            setup: f.setup,
            habito_calc: habit_by_user
                .get(f.user_id.as_str())
                .copied()
                .unwrap_or(0),
        })
        .collect()
}

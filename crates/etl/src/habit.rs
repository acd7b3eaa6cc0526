//! Habit calculation over the attribution window after first login.
//!
//! Individuals need enough distinct active days; Sellers need enough
//! payment collections. A user only gets a row when they have at least one
//! in-window transaction that their segment's rule looks at.

use chrono::NaiveDate;
use onboarding_core::config::HabitConfig;
use onboarding_core::types::{FunnelRecord, HabitRecord, SegmentKind, TransactionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Thresholds for the two segment rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitRules {
    /// Inclusive upper bound of `transaction_dt - first_login_dt`, in days.
    pub window_days: i64,
    pub min_active_days: usize,
    pub min_collections: usize,
    /// Transaction type codes that count as a payment collection.
    pub collection_types: BTreeSet<i32>,
}

impl Default for HabitRules {
    fn default() -> Self {
        Self::from(&HabitConfig::default())
    }
}

impl From<&HabitConfig> for HabitRules {
    fn from(config: &HabitConfig) -> Self {
        Self {
            window_days: config.window_days,
            min_active_days: config.min_active_days,
            min_collections: config.min_collections,
            collection_types: config.collection_types.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HabitStats {
    pub joined_transactions: usize,
    pub in_window_transactions: usize,
    pub habit_rows: usize,
    pub habitual_users: usize,
    /// Funnel users whose segment has no habit rule.
    pub unsupported_segment_users: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HabitOutcome {
    pub records: Vec<HabitRecord>,
    pub stats: HabitStats,
}

struct UserWindow<'a> {
    funnel: &'a FunnelRecord,
    kind: SegmentKind,
    active_days: BTreeSet<NaiveDate>,
    collections: usize,
}

impl HabitRules {
    fn in_window(&self, first_login: NaiveDate, transaction_dt: NaiveDate) -> bool {
        let diff_days = (transaction_dt - first_login).num_days();
        (0..=self.window_days).contains(&diff_days)
    }

    /// Compute habit rows for funnel users. The result is sorted by
    /// `user_id`; users without a qualifying in-window transaction are absent.
    pub fn compute(
        &self,
        funnel: &[FunnelRecord],
        transactions: &[TransactionRecord],
    ) -> HabitOutcome {
        let mut stats = HabitStats::default();
        let mut unsupported: BTreeMap<i32, usize> = BTreeMap::new();
        let mut windows: HashMap<&str, UserWindow<'_>> = HashMap::new();
        let mut eligible: HashMap<&str, (&FunnelRecord, SegmentKind)> = HashMap::new();

        for record in funnel {
            match SegmentKind::from_code(record.segment) {
                Some(kind) => {
                    eligible.insert(record.user_id.as_str(), (record, kind));
                }
                None => *unsupported.entry(record.segment).or_insert(0) += 1,
            }
        }

        for tx in transactions {
            let Some(&(user, kind)) = eligible.get(tx.user_id.as_str()) else {
                continue;
            };
            stats.joined_transactions += 1;

            let (Some(first_login), Some(tx_date)) = (user.first_login_dt, tx.transaction_dt)
            else {
                continue;
            };
            if !self.in_window(first_login, tx_date) {
                continue;
            }
            stats.in_window_transactions += 1;

            let is_collection = tx
                .tx_type
                .is_some_and(|t| self.collection_types.contains(&t));
            if kind == SegmentKind::Sellers && !is_collection {
                continue;
            }

            let window = windows.entry(user.user_id.as_str()).or_insert_with(|| UserWindow {
                funnel: user,
                kind,
                active_days: BTreeSet::new(),
                collections: 0,
            });
            window.active_days.insert(tx_date);
            if is_collection {
                window.collections += 1;
            }
        }

        let mut records: Vec<HabitRecord> = windows
            .into_values()
            .map(|w| HabitRecord {
                user_id: w.funnel.user_id.clone(),
                ab_group: w.funnel.ab_group,
                habito_calc: i32::from(self.is_habitual(&w)),
            })
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        stats.habit_rows = records.len();
        stats.habitual_users = records.iter().filter(|r| r.habito_calc == 1).count();
        stats.unsupported_segment_users = unsupported.values().sum();

        if stats.unsupported_segment_users > 0 {
            warn!(
                users = stats.unsupported_segment_users,
                segments = ?unsupported.keys().collect::<Vec<_>>(),
                "Users in segments without a habit rule treated as non-habitual"
            );
        }
        debug!(
            joined = stats.joined_transactions,
            in_window = stats.in_window_transactions,
            habit_rows = stats.habit_rows,
            habitual = stats.habitual_users,
            "Habit computed"
        );

        HabitOutcome { records, stats }
    }

    fn is_habitual(&self, window: &UserWindow<'_>) -> bool {
        match window.kind {
            SegmentKind::Individuals => window.active_days.len() >= self.min_active_days,
            SegmentKind::Sellers => window.collections >= self.min_collections,
        }
    }
}

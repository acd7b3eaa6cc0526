use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A/B cohort a user is assigned to for the onboarding experiment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AbGroup {
    Control,
    Treatment,
}

impl AbGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbGroup::Control => "control",
            AbGroup::Treatment => "treatment",
        }
    }
}

impl fmt::Display for AbGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "control" => Ok(AbGroup::Control),
            "treatment" => Ok(AbGroup::Treatment),
            other => Err(format!("unknown ab group '{other}'")),
        }
    }
}

/// The two user segments the product recognizes. Stored as integer codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    Individuals,
    Sellers,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 2] = [SegmentKind::Individuals, SegmentKind::Sellers];

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(SegmentKind::Individuals),
            2 => Some(SegmentKind::Sellers),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            SegmentKind::Individuals => 1,
            SegmentKind::Sellers => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SegmentKind::Individuals => "Individuals",
            SegmentKind::Sellers => "Sellers",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SegmentKind {
    type Err = String;

    /// Accepts either the display label or the integer code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i32>() {
            return SegmentKind::from_code(code).ok_or_else(|| format!("unknown segment code {code}"));
        }
        SegmentKind::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown segment '{trimmed}'"))
    }
}

/// One onboarding row after date normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingRecord {
    pub user_id: String,
    pub first_login_dt: Option<NaiveDate>,
    pub activacion_dt: Option<NaiveDate>,
    pub habito_dt: Option<NaiveDate>,
    pub setup_dt: Option<NaiveDate>,
    pub activacion: Option<u8>,
    pub setup: Option<u8>,
    /// The `return` column of the source dataset.
    pub returned: Option<u8>,
}

/// One transaction row after date normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub user_id: String,
    pub segment: Option<i32>,
    pub transaction_dt: Option<NaiveDate>,
    pub tx_type: Option<i32>,
}

/// Majority segment for a user that has transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSegment {
    pub user_id: String,
    pub segment: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortAssignment {
    pub user_id: String,
    pub ab_group: AbGroup,
}

/// Onboarding user that survived the segment filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelRecord {
    pub user_id: String,
    pub segment: i32,
    pub ab_group: AbGroup,
    pub first_login_dt: Option<NaiveDate>,
    pub drop: i32,
    pub activacion: i32,
    pub setup: i32,
}

/// Habit outcome for a user with at least one qualifying in-window transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub user_id: String,
    pub ab_group: AbGroup,
    pub habito_calc: i32,
}

/// Per-user metrics row. This is the unit persisted to the store, written to
/// the CSV snapshot, and read back by reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub user_id: String,
    pub segment: i32,
    pub ab_group: String,
    pub drop: i32,
    pub activacion: i32,
    pub setup: i32,
    pub habito_calc: i32,
}

impl MetricsRecord {
    pub fn segment_kind(&self) -> Option<SegmentKind> {
        SegmentKind::from_code(self.segment)
    }

    pub fn ab_group(&self) -> Option<AbGroup> {
        self.ab_group.parse().ok()
    }
}

/// Column order of the destination table and of the CSV snapshot.
pub const METRICS_COLUMNS: [&str; 7] = [
    "user_id",
    "segment",
    "ab_group",
    "drop",
    "activacion",
    "setup",
    "habito_calc",
];

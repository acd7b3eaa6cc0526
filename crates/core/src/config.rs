use crate::error::{EtlError, EtlResult};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `ONBOARDING_METRICS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub habit: HabitConfig,
}

/// Locations of the three upstream CSV datasets.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_onboarding_path")]
    pub onboarding_path: String,
    #[serde(default = "default_users_path")]
    pub users_path: String,
    #[serde(default = "default_transactions_path")]
    pub transactions_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_clickhouse_table")]
    pub table: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_enabled")]
    pub enabled: bool,
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_control_fraction")]
    pub control_fraction: f64,
    /// Fixed seed for reproducible assignment. Unseeded runs draw from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HabitConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_min_active_days")]
    pub min_active_days: usize,
    #[serde(default = "default_min_collections")]
    pub min_collections: usize,
    #[serde(default = "default_collection_types")]
    pub collection_types: Vec<i32>,
}

// Default functions
fn default_onboarding_path() -> String {
    "data/lk_onboarding.csv".to_string()
}
fn default_users_path() -> String {
    "data/dim_users.csv".to_string()
}
fn default_transactions_path() -> String {
    "data/bt_users_transactions.csv".to_string()
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "fintech_analytics".to_string()
}
fn default_clickhouse_table() -> String {
    "user_onboarding_metrics_clean".to_string()
}
fn default_snapshot_enabled() -> bool {
    true
}
fn default_snapshot_dir() -> String {
    "artifacts/user_onboarding_metrics_clean".to_string()
}
fn default_control_fraction() -> f64 {
    0.05
}
fn default_window_days() -> i64 {
    30
}
fn default_min_active_days() -> usize {
    5
}
fn default_min_collections() -> usize {
    5
}
fn default_collection_types() -> Vec<i32> {
    vec![8, 9]
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            onboarding_path: default_onboarding_path(),
            users_path: default_users_path(),
            transactions_path: default_transactions_path(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            table: default_clickhouse_table(),
            user: None,
            password: None,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_snapshot_enabled(),
            dir: default_snapshot_dir(),
        }
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            control_fraction: default_control_fraction(),
            seed: None,
        }
    }
}

impl Default for HabitConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_active_days: default_min_active_days(),
            min_collections: default_min_collections(),
            collection_types: default_collection_types(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            snapshot: SnapshotConfig::default(),
            cohort: CohortConfig::default(),
            habit: HabitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, overlaid with
    /// environment variables.
    pub fn load_from(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("ONBOARDING_METRICS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("habit.collection_types"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject values that would make a run meaningless or unsafe to format
    /// into SQL.
    pub fn validate(&self) -> EtlResult<()> {
        if !(0.0..=1.0).contains(&self.cohort.control_fraction) {
            return Err(EtlError::Config(format!(
                "cohort.control_fraction must be within [0, 1], got {}",
                self.cohort.control_fraction
            )));
        }
        if self.habit.window_days < 0 {
            return Err(EtlError::Config(format!(
                "habit.window_days must not be negative, got {}",
                self.habit.window_days
            )));
        }
        if self.habit.collection_types.is_empty() {
            return Err(EtlError::Config(
                "habit.collection_types must name at least one type code".to_string(),
            ));
        }
        for (key, value) in [
            ("clickhouse.database", &self.clickhouse.database),
            ("clickhouse.table", &self.clickhouse.table),
        ] {
            if !is_identifier(value) {
                return Err(EtlError::Config(format!(
                    "{key} must be a plain identifier, got '{value}'"
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_habit_rules() {
        let config = AppConfig::default();
        assert_eq!(config.cohort.control_fraction, 0.05);
        assert_eq!(config.cohort.seed, None);
        assert_eq!(config.habit.window_days, 30);
        assert_eq!(config.habit.min_active_days, 5);
        assert_eq!(config.habit.min_collections, 5);
        assert_eq!(config.habit.collection_types, vec![8, 9]);
        assert_eq!(config.clickhouse.table, "user_onboarding_metrics_clean");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.cohort.control_fraction = 1.5;
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));

        let mut config = AppConfig::default();
        config.clickhouse.table = "metrics; DROP TABLE x".to_string();
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));

        let mut config = AppConfig::default();
        config.habit.window_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onboarding.toml");
        std::fs::write(
            &path,
            "[cohort]\nseed = 42\n\n[habit]\nwindow_days = 14\n\n[clickhouse]\ntable = \"metrics_test\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.cohort.seed, Some(42));
        assert_eq!(config.cohort.control_fraction, 0.05);
        assert_eq!(config.habit.window_days, 14);
        assert_eq!(config.clickhouse.table, "metrics_test");
    }
}

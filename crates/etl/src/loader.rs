//! CSV ingestion of the onboarding, user-dimension and transaction datasets.
//!
//! Columns are matched by header name and unknown columns are ignored.
//! Values that do not parse become `None` rather than failing the load.

use crate::dates::normalize_date;
use onboarding_core::config::InputConfig;
use onboarding_core::types::{OnboardingRecord, TransactionRecord};
use onboarding_core::{EtlError, EtlResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RawOnboarding {
    user_id: String,
    #[serde(default)]
    first_login_dt: Option<String>,
    #[serde(default)]
    activacion_dt: Option<String>,
    #[serde(default)]
    habito_dt: Option<String>,
    #[serde(default)]
    setup_dt: Option<String>,
    #[serde(default)]
    activacion: Option<String>,
    #[serde(default)]
    setup: Option<String>,
    #[serde(default, rename = "return")]
    returned: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    user_id: String,
    #[serde(default)]
    segment: Option<String>,
    #[serde(default)]
    transaction_dt: Option<String>,
    #[serde(default, rename = "type")]
    tx_type: Option<String>,
}

/// Row-level counters collected while loading. Surfaced in the pipeline
/// report for data-quality auditing.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LoadStats {
    pub onboarding_rows: usize,
    pub duplicate_onboarding_rows: usize,
    pub blank_user_ids: usize,
    pub unparsed_first_login: usize,
    pub user_dimension_rows: usize,
    pub transaction_rows: usize,
    pub unparsed_transaction_dates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedInputs {
    pub onboarding: Vec<OnboardingRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub stats: LoadStats,
}

/// Reads the three datasets named in an [`InputConfig`].
pub struct InputLoader {
    config: InputConfig,
}

impl InputLoader {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    pub fn load(&self) -> EtlResult<LoadedInputs> {
        let mut stats = LoadStats::default();

        let onboarding = load_onboarding(
            open(&self.config.onboarding_path)?,
            &self.config.onboarding_path,
            &mut stats,
        )?;
        stats.user_dimension_rows = count_rows(
            open(&self.config.users_path)?,
            &self.config.users_path,
        )?;
        let transactions = load_transactions(
            open(&self.config.transactions_path)?,
            &self.config.transactions_path,
            &mut stats,
        )?;

        info!(
            onboarding = stats.onboarding_rows,
            users = stats.user_dimension_rows,
            transactions = stats.transaction_rows,
            "Datasets loaded"
        );

        Ok(LoadedInputs {
            onboarding,
            transactions,
            stats,
        })
    }
}

fn open(path: &str) -> EtlResult<File> {
    File::open(Path::new(path)).map_err(|e| EtlError::input(path, e.to_string()))
}

/// Load onboarding rows, keeping the first row seen for each `user_id`.
pub fn load_onboarding<R: Read>(
    reader: R,
    source: &str,
    stats: &mut LoadStats,
) -> EtlResult<Vec<OnboardingRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for row in rdr.deserialize::<RawOnboarding>() {
        let row = row.map_err(|e| EtlError::input(source, e.to_string()))?;
        stats.onboarding_rows += 1;

        if row.user_id.is_empty() {
            stats.blank_user_ids += 1;
            continue;
        }
        if !seen.insert(row.user_id.clone()) {
            stats.duplicate_onboarding_rows += 1;
            continue;
        }

        let first_login_dt = normalize_date(row.first_login_dt.as_deref());
        if first_login_dt.is_none() {
            stats.unparsed_first_login += 1;
        }

        records.push(OnboardingRecord {
            user_id: row.user_id,
            first_login_dt,
            activacion_dt: normalize_date(row.activacion_dt.as_deref()),
            habito_dt: normalize_date(row.habito_dt.as_deref()),
            setup_dt: normalize_date(row.setup_dt.as_deref()),
            activacion: parse_flag(row.activacion.as_deref()),
            setup: parse_flag(row.setup.as_deref()),
            returned: parse_flag(row.returned.as_deref()),
        });
    }

    if stats.duplicate_onboarding_rows > 0 {
        warn!(
            duplicates = stats.duplicate_onboarding_rows,
            source, "Duplicate onboarding user_ids ignored"
        );
    }

    Ok(records)
}

pub fn load_transactions<R: Read>(
    reader: R,
    source: &str,
    stats: &mut LoadStats,
) -> EtlResult<Vec<TransactionRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for row in rdr.deserialize::<RawTransaction>() {
        let row = row.map_err(|e| EtlError::input(source, e.to_string()))?;
        stats.transaction_rows += 1;

        if row.user_id.is_empty() {
            stats.blank_user_ids += 1;
            continue;
        }

        let transaction_dt = normalize_date(row.transaction_dt.as_deref());
        if transaction_dt.is_none() {
            stats.unparsed_transaction_dates += 1;
        }

        records.push(TransactionRecord {
            user_id: row.user_id,
            segment: parse_code(row.segment.as_deref()),
            transaction_dt,
            tx_type: parse_code(row.tx_type.as_deref()),
        });
    }

    Ok(records)
}

/// The user dimension is only counted.
pub fn count_rows<R: Read>(reader: R, source: &str) -> EtlResult<usize> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let mut count = 0;
    for record in rdr.records() {
        record.map_err(|e| EtlError::input(source, e.to_string()))?;
        count += 1;
    }
    Ok(count)
}

/// Integer code that may have been written as a float ("2.0").
fn parse_code(raw: Option<&str>) -> Option<i32> {
    let value = raw?.trim();
    if let Ok(code) = value.parse::<i32>() {
        return Some(code);
    }
    let float = value.parse::<f64>().ok()?;
    if float.fract() == 0.0 && float >= i32::MIN as f64 && float <= i32::MAX as f64 {
        Some(float as i32)
    } else {
        None
    }
}

/// 0/1 flag, accepting integer, float and boolean spellings.
fn parse_flag(raw: Option<&str>) -> Option<u8> {
    let value = raw?.trim();
    if value.eq_ignore_ascii_case("true") {
        return Some(1);
    }
    if value.eq_ignore_ascii_case("false") {
        return Some(0);
    }
    match parse_code(Some(value))? {
        0 => Some(0),
        1 => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const ONBOARDING_CSV: &str = "\
,first_login_dt,week_year,user_id,habito,habito_dt,activacion,activacion_dt,setup,setup_dt,return
0,2022-01-01,52,MLB1,0,,1,2022-01-02,1.0,2022-01-03,1
1,2022-01-05,1,MLB2,0,,0,,0,,0
2,bad-date,1,MLB3,0,,true,,,,
3,2022-01-07,1,MLB2,1,,1,,1,,1
";

    const TX_CSV: &str = "\
user_id,transaction_dt,type,segment,amount
MLB1,2022-01-02,1,1,10.5
MLB1,2022-01-03 10:00:00,8,1.0,3
MLB2,,9,2,1
,2022-01-03,9,2,1
MLB3,2022-01-04,x,abc,1
";

    #[test]
    fn test_load_onboarding_dedupes_and_normalizes() {
        let mut stats = LoadStats::default();
        let records = load_onboarding(ONBOARDING_CSV.as_bytes(), "onboarding", &mut stats).unwrap();

        assert_eq!(stats.onboarding_rows, 4);
        assert_eq!(stats.duplicate_onboarding_rows, 1);
        assert_eq!(stats.unparsed_first_login, 1);
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.user_id, "MLB1");
        assert_eq!(first.first_login_dt, NaiveDate::from_ymd_opt(2022, 1, 1));
        assert_eq!(first.habito_dt, None);
        assert_eq!(first.activacion, Some(1));
        assert_eq!(first.setup, Some(1));
        assert_eq!(first.returned, Some(1));

        // The first MLB2 row wins.
        assert_eq!(records[1].returned, Some(0));

        let third = &records[2];
        assert_eq!(third.first_login_dt, None);
        assert_eq!(third.activacion, Some(1));
        assert_eq!(third.setup, None);
        assert_eq!(third.returned, None);
    }

    #[test]
    fn test_load_transactions_parses_codes_leniently() {
        let mut stats = LoadStats::default();
        let records = load_transactions(TX_CSV.as_bytes(), "tx", &mut stats).unwrap();

        assert_eq!(stats.transaction_rows, 5);
        assert_eq!(stats.blank_user_ids, 1);
        assert_eq!(stats.unparsed_transaction_dates, 1);
        assert_eq!(records.len(), 4);

        assert_eq!(records[1].segment, Some(1));
        assert_eq!(records[1].tx_type, Some(8));
        assert_eq!(records[1].transaction_dt, NaiveDate::from_ymd_opt(2022, 1, 3));
        assert_eq!(records[2].transaction_dt, None);
        assert_eq!(records[3].segment, None);
        assert_eq!(records[3].tx_type, None);
    }

    #[test]
    fn test_count_rows_and_missing_file() {
        let csv = "user_id,rubro\nA,1\nB,2\n";
        assert_eq!(count_rows(csv.as_bytes(), "users").unwrap(), 2);

        let loader = InputLoader::new(InputConfig {
            onboarding_path: "/nonexistent/onboarding.csv".into(),
            ..InputConfig::default()
        });
        assert!(matches!(loader.load(), Err(EtlError::Input { .. })));
    }

    #[test]
    fn test_flag_spellings() {
        assert_eq!(parse_flag(Some("1")), Some(1));
        assert_eq!(parse_flag(Some("0.0")), Some(0));
        assert_eq!(parse_flag(Some("TRUE")), Some(1));
        assert_eq!(parse_flag(Some("2")), None);
        assert_eq!(parse_flag(None), None);
    }
}

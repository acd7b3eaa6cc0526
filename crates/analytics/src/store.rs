//! Metrics table persistence. Every write replaces the whole table.
//!
//! The ClickHouse store loads rows into a per-run staging table and swaps
//! it with the destination in one `EXCHANGE TABLES`, so readers see either
//! the previous run or the new one and never a half-written table.

use async_trait::async_trait;
use clickhouse::Row;
use onboarding_core::config::ClickHouseConfig;
use onboarding_core::types::MetricsRecord;
use onboarding_core::{EtlError, EtlResult};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Destination for the per-user metrics table.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Short label used in logs and reports.
    fn name(&self) -> &str;

    /// Replace the table contents with `records`. Returns the rows written.
    async fn replace_all(&self, records: &[MetricsRecord]) -> EtlResult<u64>;

    /// Full scan of the table.
    async fn fetch_all(&self) -> EtlResult<Vec<MetricsRecord>>;

    async fn count(&self) -> EtlResult<u64>;
}

/// Wire row for the metrics table. Field order matches the table columns.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct MetricsRow {
    user_id: String,
    segment: i32,
    ab_group: String,
    drop: i32,
    activacion: i32,
    setup: i32,
    habito_calc: i32,
}

impl From<&MetricsRecord> for MetricsRow {
    fn from(r: &MetricsRecord) -> Self {
        Self {
            user_id: r.user_id.clone(),
            segment: r.segment,
            ab_group: r.ab_group.clone(),
            drop: r.drop,
            activacion: r.activacion,
            setup: r.setup,
            habito_calc: r.habito_calc,
        }
    }
}

impl From<MetricsRow> for MetricsRecord {
    fn from(r: MetricsRow) -> Self {
        Self {
            user_id: r.user_id,
            segment: r.segment,
            ab_group: r.ab_group,
            drop: r.drop,
            activacion: r.activacion,
            setup: r.setup,
            habito_calc: r.habito_calc,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct CountRow {
    count: u64,
}

/// `drop` is a keyword in SQL dialects, so it is always backtick-quoted.
const SELECT_COLUMNS: &str =
    "user_id, segment, ab_group, `drop`, activacion, setup, habito_calc";

pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            user_id String,
            segment Int32,
            ab_group String,
            `drop` Int32,
            activacion Int32,
            setup Int32,
            habito_calc Int32
        ) ENGINE = ReplacingMergeTree()
        PRIMARY KEY user_id
        ORDER BY user_id"
    )
}

/// Staging table name for one run. Table names are validated as plain
/// identifiers by the config, and a simple UUID is hex only.
pub fn staging_table_name(table: &str, run_id: Uuid) -> String {
    format!("{table}_staging_{}", run_id.simple())
}

fn store_err(context: &str, e: clickhouse::error::Error) -> EtlError {
    EtlError::Store(format!("{context}: {e}"))
}

/// ClickHouse-backed metrics table.
pub struct ClickHouseStore {
    client: clickhouse::Client,
    table: String,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);
        if let Some(user) = &config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.password {
            client = client.with_password(password);
        }

        info!(url = %config.url, database = %config.database, table = %config.table, "ClickHouse store configured");

        Self {
            client,
            table: config.table.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn execute(&self, sql: &str, context: &str) -> EtlResult<()> {
        self.client
            .query(sql)
            .execute()
            .await
            .map_err(|e| store_err(context, e))
    }

    async fn ensure_schema(&self) -> EtlResult<()> {
        self.execute(&create_table_sql(&self.table), "create table")
            .await?;
        debug!(table = %self.table, "ClickHouse schema verified");
        Ok(())
    }

    async fn load_and_swap(&self, staging: &str, records: &[MetricsRecord]) -> EtlResult<()> {
        self.execute(
            &format!("CREATE TABLE {staging} AS {}", self.table),
            "create staging table",
        )
        .await?;

        if !records.is_empty() {
            let mut insert = self
                .client
                .insert::<MetricsRow>(staging)
                .map_err(|e| store_err("open insert", e))?;
            for record in records {
                insert
                    .write(&MetricsRow::from(record))
                    .await
                    .map_err(|e| store_err("insert row", e))?;
            }
            insert.end().await.map_err(|e| store_err("finish insert", e))?;
        }

        self.execute(
            &format!("EXCHANGE TABLES {staging} AND {}", self.table),
            "swap staging table",
        )
        .await
    }
}

#[async_trait]
impl MetricsStore for ClickHouseStore {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn replace_all(&self, records: &[MetricsRecord]) -> EtlResult<u64> {
        self.ensure_schema().await?;

        let staging = staging_table_name(&self.table, Uuid::new_v4());
        let result = self.load_and_swap(&staging, records).await;

        // After a successful swap the staging name holds the previous rows;
        // after a failure it holds a partial load. Either way it goes.
        if let Err(e) = self
            .execute(&format!("DROP TABLE IF EXISTS {staging}"), "drop staging table")
            .await
        {
            warn!(error = %e, staging = %staging, "Failed to drop staging table");
        }

        match result {
            Ok(()) => {
                let written = records.len() as u64;
                metrics::counter!("store.rows_written").increment(written);
                info!(table = %self.table, rows = written, "Metrics table replaced");
                Ok(written)
            }
            Err(e) => {
                metrics::counter!("store.write_errors").increment(1);
                error!(error = %e, table = %self.table, "Metrics table left unchanged");
                Err(e)
            }
        }
    }

    async fn fetch_all(&self) -> EtlResult<Vec<MetricsRecord>> {
        let rows = self
            .client
            .query(&format!("SELECT {SELECT_COLUMNS} FROM {}", self.table))
            .fetch_all::<MetricsRow>()
            .await
            .map_err(|e| store_err("select metrics", e))?;
        Ok(rows.into_iter().map(MetricsRecord::from).collect())
    }

    async fn count(&self) -> EtlResult<u64> {
        let row = self
            .client
            .query(&format!("SELECT count() AS count FROM {}", self.table))
            .fetch_one::<CountRow>()
            .await
            .map_err(|e| store_err("count metrics", e))?;
        Ok(row.count)
    }
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<MetricsRecord>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail and leave prior contents in place.
    pub fn failing() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_writes: true,
        }
    }

    pub fn with_rows(rows: Vec<MetricsRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail_writes: false,
        }
    }

    pub fn rows(&self) -> Vec<MetricsRecord> {
        self.rows.lock().expect("memory store mutex poisoned").clone()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn replace_all(&self, records: &[MetricsRecord]) -> EtlResult<u64> {
        if self.fail_writes {
            metrics::counter!("store.write_errors").increment(1);
            return Err(EtlError::Store("memory store rejects writes".to_string()));
        }
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        *rows = records.to_vec();
        Ok(rows.len() as u64)
    }

    async fn fetch_all(&self) -> EtlResult<Vec<MetricsRecord>> {
        Ok(self.rows())
    }

    async fn count(&self) -> EtlResult<u64> {
        Ok(self.rows.lock().expect("memory store mutex poisoned").len() as u64)
    }
}

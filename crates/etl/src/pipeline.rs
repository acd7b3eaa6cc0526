//! End-to-end ETL run: transform the loaded datasets into per-user metrics,
//! then persist them to the store and the CSV snapshot.

use crate::aggregate::merge_metrics;
use crate::cohort::CohortAssigner;
use crate::funnel::{join_funnel, FilterAudit};
use crate::habit::{HabitRules, HabitStats};
use crate::loader::{LoadStats, LoadedInputs};
use crate::segment::resolve_segments;
use onboarding_analytics::{MetricsStore, SnapshotWriter};
use onboarding_core::types::MetricsRecord;
use onboarding_core::AppConfig;
use onboarding_reporting::DashboardOverview;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{error, info};
use uuid::Uuid;

/// Distinct-user counts taken before any cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserAnalysis {
    pub onboarding_users: usize,
    pub transacting_users: usize,
    pub users_without_transactions: usize,
}

impl UserAnalysis {
    pub fn from_inputs(inputs: &LoadedInputs) -> Self {
        let onboarding: HashSet<&str> =
            inputs.onboarding.iter().map(|r| r.user_id.as_str()).collect();
        let transacting: HashSet<&str> =
            inputs.transactions.iter().map(|t| t.user_id.as_str()).collect();
        Self {
            onboarding_users: onboarding.len(),
            transacting_users: transacting.len(),
            users_without_transactions: onboarding.difference(&transacting).count(),
        }
    }
}

/// Result of a single persistence target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Skipped,
    Written { target: String, rows: u64 },
    Failed { target: String, error: String },
}

impl WriteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WriteOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub seed: Option<u64>,
    pub load: LoadStats,
    pub users: UserAnalysis,
    pub resolved_segments: usize,
    pub cohorts: BTreeMap<String, usize>,
    pub segment_filter: FilterAudit,
    pub segment_distribution: BTreeMap<i32, usize>,
    pub habit: HabitStats,
    pub metrics_rows: usize,
    pub overview: DashboardOverview,
    pub store: WriteOutcome,
    pub snapshot: WriteOutcome,
}

pub struct PipelineRun {
    pub report: PipelineReport,
    pub records: Vec<MetricsRecord>,
}

/// Output of the pure transformation stages.
pub struct Transformed {
    pub records: Vec<MetricsRecord>,
    pub users: UserAnalysis,
    pub resolved_segments: usize,
    pub cohorts: BTreeMap<String, usize>,
    pub segment_filter: FilterAudit,
    pub segment_distribution: BTreeMap<i32, usize>,
    pub habit: HabitStats,
}

pub struct Pipeline {
    assigner: CohortAssigner,
    rules: HabitRules,
    seed: Option<u64>,
}

impl Pipeline {
    pub fn new(assigner: CohortAssigner, rules: HabitRules, seed: Option<u64>) -> Self {
        Self {
            assigner,
            rules,
            seed,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            CohortAssigner::new(config.cohort.control_fraction),
            HabitRules::from(&config.habit),
            config.cohort.seed,
        )
    }

    /// Run every transformation stage with the given random source.
    pub fn transform<R: Rng + ?Sized>(&self, inputs: &LoadedInputs, rng: &mut R) -> Transformed {
        let users = UserAnalysis::from_inputs(inputs);
        info!(
            onboarding_users = users.onboarding_users,
            transacting_users = users.transacting_users,
            without_transactions = users.users_without_transactions,
            "Initial user analysis"
        );

        let segments = resolve_segments(&inputs.transactions);
        info!(resolved = segments.len(), "Segments resolved");

        let assignments = self.assigner.assign(&inputs.onboarding, rng);
        let mut cohorts = BTreeMap::new();
        for a in &assignments {
            *cohorts.entry(a.ab_group.to_string()).or_insert(0) += 1;
        }
        info!(distribution = ?cohorts, "A/B groups assigned");

        let funnel = join_funnel(&inputs.onboarding, &assignments, &segments);
        info!(distribution = ?funnel.segment_distribution, "Segment distribution after filter");

        let habit = self.rules.compute(&funnel.records, &inputs.transactions);
        let records = merge_metrics(&funnel.records, &habit.records);
        info!(
            rows = records.len(),
            habitual = habit.stats.habitual_users,
            "Metrics computed"
        );

        Transformed {
            records,
            users,
            resolved_segments: segments.len(),
            cohorts,
            segment_filter: funnel.audit,
            segment_distribution: funnel.segment_distribution,
            habit: habit.stats,
        }
    }

    /// Transform and persist. Write failures are logged and reported but do
    /// not abort the run.
    pub async fn run(
        &self,
        inputs: &LoadedInputs,
        store: Option<&dyn MetricsStore>,
        snapshot: Option<&SnapshotWriter>,
    ) -> PipelineRun {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, "ETL run started");

        let mut rng = CohortAssigner::rng(self.seed);
        let transformed = self.transform(inputs, &mut rng);
        let overview = DashboardOverview::from_records(&transformed.records);

        let store_outcome = match store {
            Some(store) => match store.replace_all(&transformed.records).await {
                Ok(rows) => WriteOutcome::Written {
                    target: store.name().to_string(),
                    rows,
                },
                Err(e) => {
                    error!(error = %e, store = store.name(), "Failed to write metrics store");
                    WriteOutcome::Failed {
                        target: store.name().to_string(),
                        error: e.to_string(),
                    }
                }
            },
            None => WriteOutcome::Skipped,
        };

        let snapshot_outcome = match snapshot {
            Some(writer) => {
                let target = writer.dir().display().to_string();
                match writer.write(&transformed.records) {
                    Ok(rows) => WriteOutcome::Written { target, rows },
                    Err(e) => {
                        error!(error = %e, path = %target, "Failed to write snapshot");
                        WriteOutcome::Failed {
                            target,
                            error: e.to_string(),
                        }
                    }
                }
            }
            None => WriteOutcome::Skipped,
        };

        info!(
            run_id = %run_id,
            rows = transformed.records.len(),
            filtered_out = transformed.segment_filter.filtered_out,
            "ETL run completed"
        );

        PipelineRun {
            report: PipelineReport {
                run_id,
                seed: self.seed,
                load: inputs.stats.clone(),
                users: transformed.users,
                resolved_segments: transformed.resolved_segments,
                cohorts: transformed.cohorts,
                segment_filter: transformed.segment_filter,
                segment_distribution: transformed.segment_distribution,
                habit: transformed.habit,
                metrics_rows: transformed.records.len(),
                overview,
                store: store_outcome,
                snapshot: snapshot_outcome,
            },
            records: transformed.records,
        }
    }
}

//! Dashboard read model: filters, the overview assembled from stored
//! metrics rows, a plain-text rendering and raw CSV export.

use crate::cohort::{cohort_rates, treatment_lift, CohortLift, CohortRow};
use crate::funnel::{analyze_funnel, FunnelResult};
use crate::rates::RateSummary;
use crate::segment::{segment_breakdown, SegmentBreakdown};
use onboarding_core::types::{AbGroup, MetricsRecord, SegmentKind, METRICS_COLUMNS};
use onboarding_core::EtlResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write;
use std::str::FromStr;

pub const EMPTY_TABLE_MESSAGE: &str = "No data in the metrics table. Run the ETL pipeline first.";
pub const EMPTY_FILTER_MESSAGE: &str = "No rows match the selected filters.";

/// Restricts rows to users that reached a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Milestone {
    Activated,
    Setup,
    Habit,
    /// Users that did not drop.
    Retained,
}

impl FromStr for Milestone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activated" | "activacion" => Ok(Milestone::Activated),
            "setup" => Ok(Milestone::Setup),
            "habit" | "habito" => Ok(Milestone::Habit),
            "retained" | "no-drop" | "sin-drop" => Ok(Milestone::Retained),
            other => Err(format!("unknown milestone '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardFilter {
    pub ab_group: Option<AbGroup>,
    pub segment: Option<SegmentKind>,
    pub milestone: Option<Milestone>,
}

impl DashboardFilter {
    pub fn matches(&self, record: &MetricsRecord) -> bool {
        if let Some(group) = self.ab_group {
            if record.ab_group != group.as_str() {
                return false;
            }
        }
        if let Some(segment) = self.segment {
            if record.segment != segment.code() {
                return false;
            }
        }
        match self.milestone {
            Some(Milestone::Activated) => record.activacion == 1,
            Some(Milestone::Setup) => record.setup == 1,
            Some(Milestone::Habit) => record.habito_calc == 1,
            Some(Milestone::Retained) => record.drop == 0,
            None => true,
        }
    }

    pub fn apply(&self, records: &[MetricsRecord]) -> Vec<MetricsRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Every summary view over one set of metrics rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardOverview {
    pub totals: RateSummary,
    pub funnel: FunnelResult,
    pub segments: SegmentBreakdown,
    pub cohorts: Vec<CohortRow>,
    pub lift: Option<CohortLift>,
}

impl DashboardOverview {
    pub fn from_records(records: &[MetricsRecord]) -> Self {
        let cohorts = cohort_rates(records);
        Self {
            totals: RateSummary::from_records(records),
            funnel: analyze_funnel(records),
            segments: segment_breakdown(records),
            lift: treatment_lift(&cohorts),
            cohorts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardView {
    Empty { message: String },
    Populated(Box<DashboardOverview>),
}

impl DashboardView {
    /// Build the view for the rows read from the store.
    pub fn build(records: &[MetricsRecord], filter: &DashboardFilter) -> Self {
        if records.is_empty() {
            return DashboardView::Empty {
                message: EMPTY_TABLE_MESSAGE.to_string(),
            };
        }
        let filtered = filter.apply(records);
        if filtered.is_empty() {
            return DashboardView::Empty {
                message: EMPTY_FILTER_MESSAGE.to_string(),
            };
        }
        DashboardView::Populated(Box::new(DashboardOverview::from_records(&filtered)))
    }

    pub fn render_text(&self) -> String {
        match self {
            DashboardView::Empty { message } => format!("{message}\n"),
            DashboardView::Populated(overview) => render_overview(overview),
        }
    }
}

fn render_overview(o: &DashboardOverview) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== Onboarding funnel ==");
    for step in &o.funnel.steps {
        let _ = writeln!(
            out,
            "{:<12} {:>10}  {:>6.1}%  (step {:>6.1}%)",
            step.step_name, step.users, step.pct_of_registered, step.conversion_from_previous
        );
    }

    let _ = writeln!(out, "\n== Segments ==");
    let _ = writeln!(out, "{}", rate_header("Segment"));
    for row in &o.segments.rows {
        let _ = writeln!(out, "{}", rate_line(row.segment.label(), &row.rates));
    }
    if o.segments.unrecognized_users > 0 {
        let _ = writeln!(
            out,
            "({} users in unrecognized segments)",
            o.segments.unrecognized_users
        );
    }

    let _ = writeln!(out, "\n== A/B cohorts ==");
    let _ = writeln!(out, "{}", rate_header("Group"));
    for row in &o.cohorts {
        let _ = writeln!(out, "{}", rate_line(&row.ab_group, &row.rates));
    }
    match &o.lift {
        Some(lift) => {
            let _ = writeln!(
                out,
                "Treatment - Control: activation {:+.2}pp, setup {:+.2}pp, habit {:+.2}pp, drop {:+.2}pp",
                lift.activation_diff, lift.setup_diff, lift.habit_diff, lift.drop_diff
            );
        }
        None => {
            let _ = writeln!(out, "Treatment - Control: needs users in both groups");
        }
    }

    let _ = writeln!(out, "\n== Segment x cohort ==");
    let _ = writeln!(out, "{}", rate_header("Segment/Group"));
    for row in &o.segments.by_cohort {
        let label = format!("{}/{}", row.segment.label(), row.ab_group);
        let _ = writeln!(out, "{}", rate_line(&label, &row.rates));
    }

    out
}

fn rate_header(label: &str) -> String {
    format!(
        "{:<22} {:>8} {:>9} {:>8} {:>8} {:>8}",
        label, "users", "activ%", "setup%", "habit%", "drop%"
    )
}

fn rate_line(label: &str, rates: &RateSummary) -> String {
    format!(
        "{:<22} {:>8} {:>9.1} {:>8.1} {:>8.1} {:>8.1}",
        label,
        rates.total_users,
        rates.activation_rate,
        rates.setup_rate,
        rates.habit_rate,
        rates.drop_rate
    )
}

/// Write rows as CSV with the metrics header, in table column order.
pub fn export_csv<W: Write>(records: &[MetricsRecord], writer: W) -> EtlResult<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(METRICS_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

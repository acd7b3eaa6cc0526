//! Onboarding reporting: funnel, segment and A/B cohort views over the
//! per-user metrics table.

pub mod cohort;
pub mod dashboard;
pub mod funnel;
pub mod rates;
pub mod segment;

pub use cohort::{cohort_rates, treatment_lift, CohortLift, CohortRow};
pub use dashboard::{DashboardFilter, DashboardOverview, DashboardView, Milestone};
pub use funnel::{analyze_funnel, FunnelResult};
pub use rates::RateSummary;
pub use segment::{segment_breakdown, SegmentBreakdown};

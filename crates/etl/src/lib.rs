//! Onboarding ETL: turns onboarding and transaction logs into per-user
//! funnel, habit and A/B metrics.

pub mod aggregate;
pub mod cohort;
pub mod dates;
pub mod funnel;
pub mod habit;
pub mod loader;
pub mod pipeline;
pub mod segment;

pub use cohort::CohortAssigner;
pub use habit::HabitRules;
pub use loader::{InputLoader, LoadedInputs};
pub use pipeline::{Pipeline, PipelineReport, PipelineRun, WriteOutcome};

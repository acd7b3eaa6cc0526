//! Persistence of the per-user metrics table: the queryable store and the
//! CSV snapshot directory.

pub mod snapshot;
pub mod store;

pub use snapshot::SnapshotWriter;
pub use store::{ClickHouseStore, MemoryStore, MetricsStore};

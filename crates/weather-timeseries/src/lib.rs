//! The time-series sink and its storage abstraction.

mod sink;
mod sqlite_store;
mod store;

pub use sink::{TimeSeriesSink, PING_INTERVAL};
pub use sqlite_store::SqliteTimeSeriesStore;
pub use store::{BucketResolution, TimeSeriesError, TimeSeriesStore};

//! The `TimeSeriesStore` trait: the read/write surface the time-series sink,
//! the upload controllers, and the gRPC broadcast sink's read-queries share.
//!
//! The time-series database's schema and internals live outside this
//! crate; this crate only fixes the shape a caller needs (`write`,
//! `latest_bucket`, `span`, `ping`) the way `weather-config::ConfigProvider`
//! fixes the shape of an opaque config backend.

use std::time::Duration;

use async_trait::async_trait;
use weather_types::{BucketReading, Reading};

/// The aggregation window a bucket query should use.
///
/// The schema is assumed to provide continuous aggregates at 1-minute,
/// 5-minute, and 1-hour resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketResolution {
    OneMinute,
    FiveMinutes,
    OneHour,
}

impl BucketResolution {
    pub fn as_seconds(self) -> i64 {
        match self {
            BucketResolution::OneMinute => 60,
            BucketResolution::FiveMinutes => 300,
            BucketResolution::OneHour => 3600,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeSeriesError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("decoding stored reading failed: {0}")]
    Decode(String),
}

/// A time-series store, as seen by the sink that writes to it and the
/// controllers/read-queries that pull aggregated buckets back out.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Persist one raw reading. The sink writes raw; aggregation is owned
    /// by the store.
    async fn write(&self, reading: &Reading) -> Result<(), TimeSeriesError>;

    /// The most recent aggregated bucket for `station` at `resolution`, or
    /// `None` if the store has no data for that station yet.
    async fn latest_bucket(
        &self,
        station: &str,
        resolution: BucketResolution,
    ) -> Result<Option<BucketReading>, TimeSeriesError>;

    /// Every 1-minute bucket for `station` within the last `duration`,
    /// oldest first.
    async fn span(&self, station: &str, duration: Duration) -> Result<Vec<BucketReading>, TimeSeriesError>;

    /// Liveness probe for the health monitor: open a connection and ping.
    async fn ping(&self) -> Result<(), TimeSeriesError>;
}

//! The external snow-statistics boundary.
//!
//! The snow statistical algorithm's internals live outside this crate: the
//! refresher only needs something that *can* recompute rolling totals and
//! accumulation-event series, not how. This mirrors
//! `weather-config::ConfigProvider` and `weather-timeseries::TimeSeriesStore`
//! — a capability trait standing in for a backend this crate never
//! implements.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("snow calculator error: {0}")]
pub struct CalculatorError(pub String);

/// Recomputes derived snow-accumulation statistics for one station.
///
/// Both methods are expected to read raw snow-depth samples from whatever
/// storage the concrete implementation uses (out of this crate's scope) and
/// write back derived series; the refresher only drives *when* they run.
#[async_trait]
pub trait Calculator: Send + Sync {
    /// Recompute the rolling snow-depth totals. Called every 30 s.
    async fn recompute_rolling_totals(&self, station: &str) -> Result<(), CalculatorError>;

    /// Recompute the accumulation-event series. Called every 15 minutes.
    async fn recompute_accumulation_series(&self, station: &str) -> Result<(), CalculatorError>;
}

//! Wires the snow cache refresher, if any device has snow enabled.
//!
//! `weather_snow_cache::Calculator` is deliberately left unimplemented by
//! the workspace — the snow statistical algorithm's internals live outside
//! it. [`NoopCalculator`] is the placeholder an operator is expected to
//! replace with a real implementation before relying on derived snow
//! statistics; it satisfies the trait so the refresher's timing and
//! re-validation logic can still run end-to-end.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weather_config::ConfigProvider;
use weather_snow_cache::{Calculator, CalculatorError, SnowCacheRefresher};
use weather_timeseries::TimeSeriesStore;

struct NoopCalculator;

#[async_trait]
impl Calculator for NoopCalculator {
    async fn recompute_rolling_totals(&self, station: &str) -> Result<(), CalculatorError> {
        debug!(station, "no snow calculator configured, skipping rolling-total recompute");
        Ok(())
    }

    async fn recompute_accumulation_series(&self, station: &str) -> Result<(), CalculatorError> {
        debug!(station, "no snow calculator configured, skipping accumulation-series recompute");
        Ok(())
    }
}

/// Spawns the refresher if any device has snow enabled, returning its
/// `JoinHandle` so the caller can wait for it to exit at shutdown.
pub async fn spawn_if_enabled(config: Arc<dyn ConfigProvider>, store: Arc<dyn TimeSeriesStore>, shutdown: &CancellationToken) -> Option<JoinHandle<()>> {
    let any_snow_enabled = config.devices().await.iter().any(|d| d.snow_enabled);
    if !any_snow_enabled {
        return None;
    }

    let refresher = SnowCacheRefresher::new(config, store, Arc::new(NoopCalculator));
    let child = shutdown.child_token();
    Some(tokio::spawn(async move { refresher.run(child).await }))
}

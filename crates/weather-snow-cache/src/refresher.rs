//! The snow cache refresher loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use weather_config::ConfigProvider;
use weather_timeseries::{BucketResolution, TimeSeriesStore};

use crate::calculator::Calculator;

pub const ROLLING_INTERVAL: Duration = Duration::from_secs(30);
pub const ACCUMULATION_INTERVAL: Duration = Duration::from_secs(15 * 60);
const SAMPLE_POLL_INTERVAL: Duration = Duration::from_secs(60);
const RECENT_SAMPLE_WINDOW: chrono::Duration = chrono::Duration::hours(24);

/// Chooses the snow-enabled device, waits for a recent sample, then drives
/// the 30 s / 15 min recompute cadence until shutdown or until the device's
/// snow flag is cleared by a config reload.
pub struct SnowCacheRefresher {
    config: Arc<dyn ConfigProvider>,
    store: Arc<dyn TimeSeriesStore>,
    calculator: Arc<dyn Calculator>,
}

impl SnowCacheRefresher {
    pub fn new(config: Arc<dyn ConfigProvider>, store: Arc<dyn TimeSeriesStore>, calculator: Arc<dyn Calculator>) -> Self {
        Self { config, store, calculator }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(station) = self.select_snow_device().await else {
            return;
        };

        if !self.wait_for_recent_sample(&station, &shutdown).await {
            return;
        }

        let mut rolling = tokio::time::interval(ROLLING_INTERVAL);
        let mut accumulation = tokio::time::interval(ACCUMULATION_INTERVAL);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                _ = rolling.tick() => {
                    if !self.still_enabled(&station).await {
                        return;
                    }
                    if let Err(e) = self.calculator.recompute_rolling_totals(&station).await {
                        warn!(station = %station, error = %e, "rolling snow-total recompute failed");
                    }
                }
                _ = accumulation.tick() => {
                    if !self.still_enabled(&station).await {
                        return;
                    }
                    if let Err(e) = self.calculator.recompute_accumulation_series(&station).await {
                        warn!(station = %station, error = %e, "snow accumulation-series recompute failed");
                    }
                }
            }
        }
    }

    async fn select_snow_device(&self) -> Option<String> {
        self.config.devices().await.into_iter().find(|d| d.snow_enabled).map(|d| d.name)
    }

    async fn still_enabled(&self, station: &str) -> bool {
        self.config.devices().await.iter().any(|d| d.name == station && d.snow_enabled)
    }

    /// Polls until the store has a bucket for `station` stamped within the
    /// last 24 h, or `shutdown` fires. Returns `false` if cancelled first.
    async fn wait_for_recent_sample(&self, station: &str, shutdown: &CancellationToken) -> bool {
        loop {
            if let Ok(Some(bucket)) = self.store.latest_bucket(station, BucketResolution::OneMinute).await {
                if Utc::now() - bucket.bucket <= RECENT_SAMPLE_WINDOW {
                    return true;
                }
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return false,
                () = tokio::time::sleep(SAMPLE_POLL_INTERVAL) => {}
            }
        }
    }
}

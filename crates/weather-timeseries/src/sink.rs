//! The time-series sink: consumes the distributor's sink channel and writes
//! every reading to the configured [`TimeSeriesStore`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use weather_types::{HealthStatus, ReadingReceiver, ShutdownHandle, Sink, SinkHealth, SinkKind};

use crate::store::TimeSeriesStore;

/// How often the health monitor's probe interval applies when this sink is
/// driven standalone rather than through `weather-health`.
pub const PING_INTERVAL: Duration = Duration::from_secs(60);

pub struct TimeSeriesSink {
    store: Arc<dyn TimeSeriesStore>,
}

impl TimeSeriesSink {
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Sink for TimeSeriesSink {
    fn kind(&self) -> SinkKind {
        SinkKind::TimeSeries
    }

    async fn start(&self, shutdown: ShutdownHandle, mut rx: ReadingReceiver) {
        loop {
            let reading = tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                reading = rx.recv() => match reading {
                    Some(r) => r,
                    None => return,
                },
            };

            // Write errors are logged and never propagate: the channel
            // keeps draining regardless of store failures.
            if let Err(e) = self.store.write(&reading).await {
                warn!(station = %reading.station_name, error = %e, "time-series write failed");
            }
        }
    }

    async fn check_health(&self) -> SinkHealth {
        match self.store.ping().await {
            Ok(()) => SinkHealth {
                status: HealthStatus::Healthy,
                message: "ok".to_owned(),
                last_check: Utc::now(),
            },
            Err(e) => SinkHealth {
                status: HealthStatus::Unhealthy,
                message: e.to_string(),
                last_check: Utc::now(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::SqliteTimeSeriesStore;
    use crate::store::BucketResolution;
    use weather_types::Reading;

    #[tokio::test]
    async fn writes_submitted_readings_to_the_store() {
        let store = Arc::new(SqliteTimeSeriesStore::open_in_memory().unwrap());
        let sink = TimeSeriesSink::new(store.clone());
        let (tx, rx) = tokio::sync::mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(async move { sink.start(shutdown.clone(), rx).await; (shutdown,) });

        tx.send(Reading::new("k1", "davis", Utc::now())).await.unwrap();
        drop(tx);
        let (shutdown,) = task.await.unwrap();
        shutdown.cancel();

        let bucket = store.latest_bucket("k1", BucketResolution::OneMinute).await.unwrap();
        assert!(bucket.is_some());
    }

    #[tokio::test]
    async fn check_health_reports_healthy_for_a_reachable_store() {
        let store = Arc::new(SqliteTimeSeriesStore::open_in_memory().unwrap());
        let sink = TimeSeriesSink::new(store);
        let health = sink.check_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
    }
}

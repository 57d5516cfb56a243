//! Drives periodic `check_health()` probes against every running sink.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use weather_types::{Sink, SinkKind};

use crate::table::HealthTable;

/// Probe cadence for every sink except APRS.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(60);
/// APRS gets a slower cadence because each probe touches the network.
pub const APRS_PROBE_INTERVAL: Duration = Duration::from_secs(90);

pub struct HealthMonitor {
    table: HealthTable,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self { table: HealthTable::new() }
    }

    pub fn table(&self) -> HealthTable {
        self.table.clone()
    }

    /// Spawns one probe task per sink and waits for all of them to exit.
    /// A probe failure never stops the sink it watches — `check_health`
    /// itself never returns an error, only an `Unhealthy` status.
    pub async fn run(&self, sinks: Vec<Arc<dyn Sink>>, shutdown: CancellationToken) {
        let handles: Vec<_> = sinks
            .into_iter()
            .map(|sink| {
                let table = self.table.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { probe_loop(sink, table, shutdown).await })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn interval_for(kind: SinkKind) -> Duration {
    if kind == SinkKind::Aprs {
        APRS_PROBE_INTERVAL
    } else {
        PROBE_INTERVAL
    }
}

async fn probe_loop(sink: Arc<dyn Sink>, table: HealthTable, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval_for(sink.kind()));
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let health = sink.check_health().await;
                table.record(sink.kind(), health);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use weather_types::{HealthStatus, ReadingReceiver, ShutdownHandle, SinkHealth};

    struct StubSink {
        kind: SinkKind,
    }

    #[async_trait]
    impl Sink for StubSink {
        fn kind(&self) -> SinkKind {
            self.kind
        }

        async fn start(&self, _shutdown: ShutdownHandle, _rx: ReadingReceiver) {}

        async fn check_health(&self) -> SinkHealth {
            SinkHealth { status: HealthStatus::Healthy, message: "ok".to_owned(), last_check: Utc::now() }
        }
    }

    #[test]
    fn aprs_gets_the_slower_probe_cadence() {
        assert_eq!(interval_for(SinkKind::Aprs), APRS_PROBE_INTERVAL);
        assert_eq!(interval_for(SinkKind::TimeSeries), PROBE_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn run_records_a_health_entry_after_one_tick() {
        let monitor = HealthMonitor::new();
        let table = monitor.table();
        let shutdown = CancellationToken::new();
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(StubSink { kind: SinkKind::TimeSeries })];

        let shutdown_clone = shutdown.clone();
        let task = tokio::spawn(async move { monitor.run(sinks, shutdown_clone).await });

        tokio::time::advance(PROBE_INTERVAL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        assert!(table.get(SinkKind::TimeSeries).is_some());

        shutdown.cancel();
        task.await.unwrap();
    }
}

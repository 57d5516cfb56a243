//! Drives config hot-reload: periodically asks the provider to re-read its
//! backing store, and on a materially different snapshot, rebuilds the
//! desired ingester topology and diffs it against the running one,
//! starting and stopping individual components as needed.
//!
//! Sinks are deliberately not part of this loop: a `SinkDescriptor` is tied
//! to a config *revision* rather than to per-field diffing, and every sink
//! this daemon ships is cheap to leave running across a device-list change
//! that doesn't touch sink settings. A revision that changes sink
//! enablement takes effect on the next restart; this is recorded as a
//! deliberate simplification in `DESIGN.md`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use weather_config::ConfigProvider;
use weather_supervisor::Supervisor;

/// How often the provider is asked to re-check its backing store.
pub const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Poll `config.reload()` on a timer; whenever it produces a change,
/// reconcile `supervisor`'s running ingesters against the new device list.
/// Runs until `shutdown` fires.
pub async fn run(config: Arc<dyn ConfigProvider>, supervisor: Arc<Supervisor>, shutdown: CancellationToken) {
    let mut rx = config.subscribe();
    let mut ticker = tokio::time::interval(RELOAD_POLL_INTERVAL);
    ticker.tick().await; // first tick fires immediately; nothing to reload yet

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let _ = config.reload().await;
                if rx.has_changed().unwrap_or(false) {
                    rx.mark_unchanged();
                    supervisor.reload(&shutdown).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;
    use weather_config::ConfigError;
    use weather_distributor::Distributor;
    use weather_supervisor::IngesterRegistry;
    use weather_types::{Device, RemoteStation, SinkDescriptor, Transport};

    struct ReloadingConfig {
        devices: tokio::sync::Mutex<Vec<Device>>,
        tx: watch::Sender<()>,
        reload_calls: AtomicUsize,
    }

    #[async_trait]
    impl ConfigProvider for ReloadingConfig {
        async fn devices(&self) -> Vec<Device> {
            self.devices.lock().await.clone()
        }
        async fn sinks(&self) -> SinkDescriptor {
            SinkDescriptor::default()
        }
        fn subscribe(&self) -> watch::Receiver<()> {
            self.tx.subscribe()
        }
        async fn reload(&self) -> Result<(), ConfigError> {
            self.reload_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remote_stations(&self) -> Vec<RemoteStation> {
            vec![]
        }
        async fn save_remote_station(&self, _station: RemoteStation) -> Result<(), ConfigError> {
            Ok(())
        }
        async fn delete_remote_station(&self, _station_id: &str) -> Result<(), ConfigError> {
            Ok(())
        }
        async fn grpc_client_station_id(&self) -> Option<String> {
            None
        }
        async fn save_grpc_client_station_id(&self, _station_id: &str) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    fn device(name: &str) -> Device {
        Device {
            name: name.to_owned(),
            device_type: "davis".to_owned(),
            transport: Transport::Tcp { hostname: "h".to_owned(), port: 1 },
            wind_dir_correction: 0,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads: Default::default(),
            options: Default::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_change_notification_triggers_a_supervisor_reload() {
        let (tx, _initial_rx) = watch::channel(());
        let config = Arc::new(ReloadingConfig {
            devices: tokio::sync::Mutex::new(vec![device("k1")]),
            tx,
            reload_calls: AtomicUsize::new(0),
        });
        let (distributor, _input_rx) = Distributor::new(10);
        let supervisor = Arc::new(Supervisor::new(IngesterRegistry::new(), config.clone(), distributor));
        let shutdown = CancellationToken::new();

        let task = {
            let config = config.clone();
            let supervisor = supervisor.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run(config, supervisor, shutdown).await })
        };

        tokio::time::advance(RELOAD_POLL_INTERVAL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(config.reload_calls.load(Ordering::SeqCst), 1);

        // Provider reports no change yet (`subscribe` never fired) so the
        // supervisor's device list should still be empty (no ingester type
        // registered, so `start`/`reload` are no-ops either way) — this just
        // exercises that the poll loop doesn't panic on a quiet tick.
        config.tx.send(()).unwrap();
        tokio::time::advance(RELOAD_POLL_INTERVAL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(config.reload_calls.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        task.await.unwrap();
    }
}

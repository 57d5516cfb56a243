//! Station supervisor: lifecycle of every configured ingester.
//!
//! Grounded on the teacher's general start/stop task-handle bookkeeping
//! (spawn, remember a handle, `.stop()`/timeout on shutdown — the shape
//! repeated across `services/receiver`'s and `services/forwarder`'s `main`
//! functions) generalized to diff-by-name reload instead of a single
//! start/stop pair.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weather_config::ConfigProvider;
use weather_distributor::Distributor;
use weather_types::{Device, Ingester};

use crate::registry::IngesterRegistry;

/// Default bound on how long `stop()` may take before the supervisor gives
/// up waiting and proceeds.
pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(30);

struct Running {
    device: Device,
    ingester: Arc<dyn Ingester>,
    child_token: CancellationToken,
}

/// Owns every running ingester and reconciles them against the config
/// provider's current device list.
pub struct Supervisor {
    registry: IngesterRegistry,
    config: Arc<dyn ConfigProvider>,
    distributor: Distributor,
    stop_grace_period: Duration,
    running: tokio::sync::Mutex<HashMap<String, Running>>,
}

impl Supervisor {
    pub fn new(registry: IngesterRegistry, config: Arc<dyn ConfigProvider>, distributor: Distributor) -> Self {
        Self {
            registry,
            config,
            distributor,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            running: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }

    /// Enumerate devices from the config provider and start every one, in
    /// parallel, without waiting for any of them to produce their first
    /// reading — satisfied here because `Ingester::start` itself must
    /// return promptly.
    pub async fn start(&self, shutdown: &CancellationToken) {
        let devices = self.config.devices().await;
        let futures = devices.into_iter().map(|d| self.start_one(d, shutdown));
        futures::future::join_all(futures).await;
    }

    /// Diff the provider's current device list against the running set by
    /// name: start new names, stop removed names, restart names whose
    /// config changed.
    pub async fn reload(&self, shutdown: &CancellationToken) {
        let desired = self.config.devices().await;
        let desired_by_name: HashMap<&str, &Device> = desired.iter().map(|d| (d.name.as_str(), d)).collect();

        let stale: Vec<String> = {
            let running = self.running.lock().await;
            running
                .iter()
                .filter(|(name, r)| match desired_by_name.get(name.as_str()) {
                    None => true,
                    Some(desired) => *desired != &r.device,
                })
                .map(|(name, _)| name.clone())
                .collect()
        };
        for name in stale {
            self.stop_one(&name).await;
        }

        let running_names: Vec<String> = self.running.lock().await.keys().cloned().collect();
        let to_start: Vec<Device> = desired
            .into_iter()
            .filter(|d| !running_names.contains(&d.name))
            .collect();
        let futures = to_start.into_iter().map(|d| self.start_one(d, shutdown));
        futures::future::join_all(futures).await;
    }

    /// Cancel and stop every running ingester, honoring the per-ingester
    /// grace period. Call once at process shutdown, after `shutdown` (the
    /// root token) has already been cancelled.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.running.lock().await.keys().cloned().collect();
        for name in names {
            self.stop_one(&name).await;
        }
    }

    async fn start_one(&self, device: Device, shutdown: &CancellationToken) {
        if let Err(e) = device.validate() {
            warn!(device = %device.name, error = %e, "skipping device with invalid configuration");
            return;
        }
        let ingester: Arc<dyn Ingester> = match self.registry.build(&device) {
            Ok(i) => Arc::from(i),
            Err(e) => {
                warn!(device = %device.name, error = %e, "skipping device, ingester construction failed");
                return;
            }
        };
        let child_token = shutdown.child_token();
        let out = self.distributor.input_handle();
        match ingester.start(child_token.clone(), out).await {
            Ok(()) => {
                info!(device = %device.name, device_type = %device.device_type, "ingester started");
                self.running.lock().await.insert(
                    device.name.clone(),
                    Running { device, ingester, child_token },
                );
            }
            Err(e) => {
                warn!(device = %device.name, error = %e, "ingester failed to start");
            }
        }
    }

    async fn stop_one(&self, name: &str) {
        let removed = self.running.lock().await.remove(name);
        let Some(running) = removed else { return };
        running.child_token.cancel();
        let outcome = tokio::time::timeout(self.stop_grace_period, running.ingester.stop()).await;
        if outcome.is_err() {
            warn!(device = %name, "ingester did not stop within grace period, proceeding anyway");
        } else {
            info!(device = %name, "ingester stopped");
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
    use weather_types::{IngestError, ReadingSender, RemoteStation, ShutdownHandle, SinkDescriptor, Transport};

    struct CountingIngester {
        name: String,
        stop_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Ingester for CountingIngester {
        fn name(&self) -> &str {
            &self.name
        }
        async fn start(&self, _ctx: ShutdownHandle, _out: ReadingSender) -> Result<(), IngestError> {
            Ok(())
        }
        async fn stop(&self) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StaticConfig {
        devices: tokio::sync::Mutex<Vec<Device>>,
        tx: watch::Sender<()>,
    }

    fn device(name: &str, device_type: &str) -> Device {
        Device {
            name: name.into(),
            device_type: device_type.into(),
            transport: Transport::Tcp { hostname: "h".into(), port: 1 },
            wind_dir_correction: 0,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads: Default::default(),
            options: Default::default(),
        }
    }

    #[async_trait]
    impl ConfigProvider for StaticConfig {
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

    fn registry_with_counting(stop_calls: Arc<AtomicUsize>) -> IngesterRegistry {
        let mut registry = IngesterRegistry::new();
        let calls = stop_calls.clone();
        registry.register(
            "davis",
            Arc::new(move |d: &Device| {
                Ok(Box::new(CountingIngester {
                    name: d.name.clone(),
                    stop_calls: calls.clone(),
                }) as Box<dyn Ingester>)
            }),
        );
        registry
    }

    #[tokio::test]
    async fn start_spawns_one_ingester_per_device() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(stop_calls);
        let (tx, _rx) = watch::channel(());
        let config = Arc::new(StaticConfig {
            devices: tokio::sync::Mutex::new(vec![device("k1", "davis"), device("k2", "davis")]),
            tx,
        });
        let (distributor, _input_rx) = Distributor::new(10);
        let supervisor = Supervisor::new(registry, config, distributor);
        let shutdown = CancellationToken::new();
        supervisor.start(&shutdown).await;
        assert_eq!(supervisor.running.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn reload_stops_removed_device() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(stop_calls.clone());
        let (tx, _rx) = watch::channel(());
        let config = Arc::new(StaticConfig {
            devices: tokio::sync::Mutex::new(vec![device("k1", "davis")]),
            tx,
        });
        let (distributor, _input_rx) = Distributor::new(10);
        let supervisor = Supervisor::new(registry, config.clone(), distributor);
        let shutdown = CancellationToken::new();
        supervisor.start(&shutdown).await;

        config.devices.lock().await.clear();
        supervisor.reload(&shutdown).await;

        assert_eq!(supervisor.running.lock().await.len(), 0);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_restarts_device_whose_config_changed() {
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(stop_calls.clone());
        let (tx, _rx) = watch::channel(());
        let config = Arc::new(StaticConfig {
            devices: tokio::sync::Mutex::new(vec![device("k1", "davis")]),
            tx,
        });
        let (distributor, _input_rx) = Distributor::new(10);
        let supervisor = Supervisor::new(registry, config.clone(), distributor);
        let shutdown = CancellationToken::new();
        supervisor.start(&shutdown).await;

        let mut changed = device("k1", "davis");
        changed.wind_dir_correction = 10;
        *config.devices.lock().await = vec![changed];
        supervisor.reload(&shutdown).await;

        assert_eq!(supervisor.running.lock().await.len(), 1);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_stop_grace_period_does_not_hang_forever() {
        struct NeverStops;
        #[async_trait]
        impl Ingester for NeverStops {
            fn name(&self) -> &str {
                "never"
            }
            async fn start(&self, _ctx: ShutdownHandle, _out: ReadingSender) -> Result<(), IngestError> {
                Ok(())
            }
            async fn stop(&self) {
                std::future::pending::<()>().await;
            }
        }
        let mut registry = IngesterRegistry::new();
        registry.register("davis", Arc::new(|_d: &Device| Ok(Box::new(NeverStops) as Box<dyn Ingester>)));
        let (tx, _rx) = watch::channel(());
        let config = Arc::new(StaticConfig {
            devices: tokio::sync::Mutex::new(vec![device("k1", "davis")]),
            tx,
        });
        let (distributor, _input_rx) = Distributor::new(10);
        let supervisor = Supervisor::new(registry, config, distributor).with_stop_grace_period(Duration::from_millis(20));
        let shutdown = CancellationToken::new();
        supervisor.start(&shutdown).await;

        tokio::time::timeout(Duration::from_secs(1), supervisor.stop_all())
            .await
            .expect("stop_all must not hang past the grace period");
    }
}

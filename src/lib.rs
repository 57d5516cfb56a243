//! RemoteWeather daemon orchestration: CLI, startup/shutdown, and the
//! cyclic start order (config → time-series store → distributor → sinks →
//! ingesters → upload controllers → health monitor).

mod error;
mod registry;
mod reload;
mod sinks;
mod snow;
mod uploads;

pub mod cli;

pub use cli::{Cli, ConfigBackend};
pub use error::DaemonError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weather_config::{ConfigProvider, TomlConfigProvider};
use weather_distributor::Distributor;
use weather_health::HealthMonitor;
use weather_supervisor::{Supervisor, DEFAULT_STOP_GRACE_PERIOD};
use weather_timeseries::{SqliteTimeSeriesStore, TimeSeriesStore};

/// Run the daemon to completion: build every component in startup order,
/// wait for a shutdown signal, then tear down in reverse order.
pub async fn run(cli: Cli) -> Result<(), DaemonError> {
    if cli.config_backend == ConfigBackend::Sqlite {
        return Err(DaemonError::Fatal(
            "the sqlite config backend is not implemented; use --config-backend file".to_owned(),
        ));
    }

    // 1. config
    let state_path = sibling(&cli.config, "remoteweather-state.toml");
    let config: Arc<dyn ConfigProvider> = TomlConfigProvider::open(cli.config.clone(), state_path).await?;

    // 2. time-series store
    let store_path = sibling(&cli.config, "remoteweather-timeseries.sqlite3");
    let store: Arc<dyn TimeSeriesStore> = Arc::new(SqliteTimeSeriesStore::open(&store_path)?);

    // 3. distributor
    let (distributor, input_rx) = Distributor::new(weather_distributor::DEFAULT_INPUT_CAPACITY);
    let shutdown = CancellationToken::new();
    let distributor_task = {
        let distributor = distributor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { weather_distributor::run(distributor, input_rx, shutdown).await })
    };

    // 4. sinks
    let (sinks, sink_tasks) = sinks::spawn_all(config.clone(), &distributor, store.clone(), &shutdown).await;

    // 5. ingesters
    let ingester_registry = registry::build(config.clone());
    let supervisor = Arc::new(Supervisor::new(ingester_registry, config.clone(), distributor.clone()));
    supervisor.start(&shutdown).await;

    // 6. upload controllers
    let upload_tasks = uploads::spawn_all(config.clone(), store.clone(), &shutdown).await;
    let snow_task = snow::spawn_if_enabled(config.clone(), store.clone(), &shutdown).await;

    // Every sink, upload controller, and snow-refresher task is tracked here
    // so shutdown can wait on it instead of leaving it fire-and-forget.
    let mut background_tasks: Vec<JoinHandle<()>> = sink_tasks;
    background_tasks.extend(upload_tasks);
    background_tasks.extend(snow_task);

    // 7. health monitor
    let health_monitor = HealthMonitor::new();
    let health_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { health_monitor.run(sinks, shutdown).await })
    };

    // config hot-reload: poll the provider and diff the ingester topology
    // against it on every change.
    let reload_task = {
        let config = config.clone();
        let supervisor = supervisor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reload::run(config, supervisor, shutdown).await })
    };

    info!("remoteweather started");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");

    shutdown.cancel();
    supervisor.stop_all().await;

    let background_join = futures::future::join_all(background_tasks);
    if tokio::time::timeout(DEFAULT_STOP_GRACE_PERIOD, background_join).await.is_err() {
        warn!("sink/upload-controller/snow-refresher tasks did not all stop within the grace period, proceeding anyway");
    }

    let _ = distributor_task.await;
    let _ = health_task.await;
    let _ = reload_task.await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install a SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn sibling(config_path: &Path, file_name: &str) -> PathBuf {
    config_path.parent().filter(|p| !p.as_os_str().is_empty()).map(|dir| dir.join(file_name)).unwrap_or_else(|| PathBuf::from(file_name))
}

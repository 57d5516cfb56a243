//! Builds and spawns every enabled sink from a [`SinkDescriptor`], and the
//! APRS station list from device options. Sinks must exist before the
//! distributor dispatches any reading.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use weather_aprs::{AprsSink, AprsStation};
use weather_config::ConfigProvider;
use weather_distributor::Distributor;
use weather_grpc::{GrpcBroadcastSink, GrpcClientSink};
use weather_timeseries::{TimeSeriesSink, TimeSeriesStore};
use weather_types::{Device, Sink};

/// Fallback APRS-IS server, used when no device names one via
/// `options.aprs_server` (`SinkDescriptor` carries an enable flag only, not
/// an address — every APRS-enabled deployment is expected to either share
/// this default or override it per station).
const DEFAULT_APRS_SERVER: &str = "rotate.aprs2.net:14580";
const DEFAULT_GRPC_BROADCAST_BIND: &str = "0.0.0.0:50051";
const SOFTWARE_VERSION: &str = concat!("remoteweather ", env!("CARGO_PKG_VERSION"));

/// Spawns every sink enabled by `config.sinks()` against `distributor`.
/// Returns the sinks themselves (for the health monitor to poll) and the
/// `JoinHandle` of each sink's task, so the caller can wait for every sink
/// to actually exit at shutdown instead of treating them as fire-and-forget.
pub async fn spawn_all(
    config: Arc<dyn ConfigProvider>,
    distributor: &Distributor,
    store: Arc<dyn TimeSeriesStore>,
    shutdown: &CancellationToken,
) -> (Vec<Arc<dyn Sink>>, Vec<JoinHandle<()>>) {
    let descriptor = config.sinks().await;
    let devices = config.devices().await;
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if descriptor.timeseries_enabled {
        let sink: Arc<dyn Sink> = Arc::new(TimeSeriesSink::new(store.clone()));
        handles.push(spawn_sink(sink.clone(), distributor, shutdown).await);
        sinks.push(sink);
    }

    if descriptor.grpc_broadcast_enabled {
        let bind_addr = descriptor.grpc_broadcast_bind.clone().unwrap_or_else(|| DEFAULT_GRPC_BROADCAST_BIND.to_owned());
        let sink: Arc<dyn Sink> = Arc::new(GrpcBroadcastSink::new(bind_addr, None, Some(store.clone())));
        handles.push(spawn_sink(sink.clone(), distributor, shutdown).await);
        sinks.push(sink);
    }

    if descriptor.grpc_client_enabled {
        if let Some(upstream_url) = descriptor.grpc_client_upstream_url.clone() {
            let sink: Arc<dyn Sink> = Arc::new(GrpcClientSink::new(upstream_url, config.clone()));
            handles.push(spawn_sink(sink.clone(), distributor, shutdown).await);
            sinks.push(sink);
        } else {
            tracing::warn!("grpc_client_enabled is set but no grpc_client_upstream_url was configured; skipping");
        }
    }

    if descriptor.aprs_enabled {
        let stations = aprs_stations(&devices);
        if stations.is_empty() {
            tracing::warn!("aprs_enabled is set but no device names an aprs_callsign + location; skipping");
        } else {
            let server_addr = devices
                .iter()
                .find_map(|d| d.options.get("aprs_server").cloned())
                .unwrap_or_else(|| DEFAULT_APRS_SERVER.to_owned());
            let sink: Arc<dyn Sink> = Arc::new(AprsSink::new(server_addr, SOFTWARE_VERSION, stations));
            handles.push(spawn_sink(sink.clone(), distributor, shutdown).await);
            sinks.push(sink);
        }
    }

    (sinks, handles)
}

async fn spawn_sink(sink: Arc<dyn Sink>, distributor: &Distributor, shutdown: &CancellationToken) -> JoinHandle<()> {
    let (_handle, rx) = distributor.register(None).await;
    let child = shutdown.child_token();
    tokio::spawn(async move { sink.start(child, rx).await })
}

fn aprs_stations(devices: &[Device]) -> Vec<AprsStation> {
    devices
        .iter()
        .filter_map(|d| {
            let callsign = d.options.get("aprs_callsign")?.clone();
            let location = d.location?;
            let ssid = d.options.get("aprs_ssid").and_then(|v| v.parse().ok());
            Some(AprsStation { station_name: d.name.clone(), callsign, ssid, location })
        })
        .collect()
}

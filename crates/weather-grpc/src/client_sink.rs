//! The gRPC-stream client sink: forwards every local reading to an
//! upstream `WeatherV1` receiver.
//!
//! Session bookkeeping (connect, register, stream, reconnect-on-error with
//! backoff) is grounded on the teacher's `UplinkSession`
//! (`services/forwarder/src/uplink.rs`): a typed session owning the
//! connection, driven by a `tokio::select!` over shutdown vs. work, with
//! exponential backoff between reconnect attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Request;
use tracing::{debug, info, warn};
use weather_config::ConfigProvider;
use weather_types::{HealthStatus, ReadingReceiver, ShutdownHandle, Sink, SinkHealth, SinkKind};

use crate::proto::weather_v1_client::WeatherV1Client;
use crate::proto::{RemoteStationConfig, WeatherReading};

/// Minimum backoff between reconnect attempts.
pub const BACKOFF_MIN: Duration = Duration::from_secs(1);
/// Maximum backoff between reconnect attempts.
pub const BACKOFF_MAX: Duration = Duration::from_secs(60);
/// Periodic state-check interval while a session is connected.
pub const STATE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Station types that must not be re-forwarded upstream, to avoid a
/// receive-then-resend loop.
const LOOP_PREVENTED_STATION_TYPE: &str = "grpc-receiver";

pub struct GrpcClientSink {
    upstream_url: String,
    config: Arc<dyn ConfigProvider>,
    connected: AtomicBool,
}

impl GrpcClientSink {
    pub fn new(upstream_url: impl Into<String>, config: Arc<dyn ConfigProvider>) -> Self {
        Self { upstream_url: upstream_url.into(), config, connected: AtomicBool::new(false) }
    }

    async fn run_session(&self, rx: &mut ReadingReceiver, shutdown: &ShutdownHandle) -> Result<(), tonic::transport::Error> {
        let channel = Channel::from_shared(self.upstream_url.clone())?.connect().await?;
        let mut client = WeatherV1Client::new(channel);

        let persisted_id = self.config.grpc_client_station_id().await.unwrap_or_default();
        let ack = client
            .register_remote_station(Request::new(RemoteStationConfig {
                station_id: persisted_id,
                timeseries_enabled: true,
                grpc_broadcast_enabled: false,
            }))
            .await;

        let station_id = match ack {
            Ok(resp) => {
                let ack = resp.into_inner();
                if !ack.success {
                    warn!(message = %ack.message, "upstream rejected registration");
                }
                ack.station_id
            }
            Err(e) => {
                warn!(error = %e, "registration RPC failed");
                return Ok(());
            }
        };

        if let Err(e) = self.config.save_grpc_client_station_id(&station_id).await {
            warn!(error = %e, "failed to persist issued station_id");
        }

        let (tx, outgoing_rx) = mpsc::channel::<WeatherReading>(16);
        let outbound = ReceiverStream::new(outgoing_rx);
        let mut send_call = client.send_weather_readings(Request::new(outbound));

        self.connected.store(true, Ordering::Relaxed);
        info!(station_id = %station_id, "gRPC-stream client session established");

        let mut state_check = tokio::time::interval(STATE_CHECK_INTERVAL);
        let result = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                reading = rx.recv() => match reading {
                    Some(r) => {
                        if r.station_type == LOOP_PREVENTED_STATION_TYPE {
                            debug!(station = %r.station_name, "loop-prevention: not re-forwarding a relayed reading");
                            continue;
                        }
                        let mut wire = WeatherReading::from(&r);
                        wire.station_id = station_id.clone();
                        if tx.send(wire).await.is_err() {
                            break Ok(());
                        }
                    }
                    None => break Ok(()),
                },
                _ = state_check.tick() => {
                    debug!("gRPC-stream client periodic state check");
                }
                result = &mut send_call => {
                    if let Err(e) = result {
                        warn!(error = %e, "send_weather_readings call ended with an error");
                    }
                    break Ok(());
                }
            }
        };

        self.connected.store(false, Ordering::Relaxed);
        result
    }
}

#[async_trait]
impl Sink for GrpcClientSink {
    fn kind(&self) -> SinkKind {
        SinkKind::GrpcClient
    }

    async fn start(&self, shutdown: ShutdownHandle, mut rx: ReadingReceiver) {
        let mut backoff = BACKOFF_MIN;
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            match self.run_session(&mut rx, &shutdown).await {
                Ok(()) => backoff = BACKOFF_MIN,
                Err(e) => {
                    warn!(error = %e, "gRPC-stream client connect failed");
                    backoff = (backoff * 2).min(BACKOFF_MAX);
                }
            }

            if shutdown.is_cancelled() {
                return;
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn check_health(&self) -> SinkHealth {
        let connected = self.connected.load(Ordering::Relaxed);
        SinkHealth {
            status: if connected { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
            message: if connected { "connected".to_owned() } else { "not connected".to_owned() },
            last_check: Utc::now(),
        }
    }
}

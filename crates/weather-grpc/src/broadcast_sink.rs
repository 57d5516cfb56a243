//! The gRPC-stream broadcast sink: serves live-weather subscribers and the
//! point/span read queries.
//!
//! Maintains a slice of per-subscriber channels behind an `RwLock`, the same
//! shape `weather-distributor` uses for sink registration, here applied one
//! level up (subscribers of a sink, rather than sinks of the distributor).
//! Also answers `GetWeatherSpan`/`GetLatestReading` directly against the
//! time-series store when one is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};
use weather_timeseries::{BucketResolution, TimeSeriesStore};
use weather_types::{HealthStatus, Reading, ReadingReceiver, ShutdownHandle, Sink, SinkHealth, SinkKind};

use crate::proto::weather_v1_server::{WeatherV1, WeatherV1Server};
use crate::proto::{Empty, LatestReq, LiveReq, RegistrationAck, RemoteStationConfig, SpanReq, WeatherReading, WeatherSpan};

/// Per-subscriber channel capacity.
const SUBSCRIBER_CAPACITY: usize = 10;

struct Subscribers {
    next_id: AtomicU64,
    channels: RwLock<HashMap<u64, (Option<String>, mpsc::Sender<Result<WeatherReading, Status>>)>>,
}

pub struct GrpcBroadcastSink {
    bind_addr: String,
    default_station: Option<String>,
    store: Option<Arc<dyn TimeSeriesStore>>,
    subscribers: Arc<Subscribers>,
}

impl GrpcBroadcastSink {
    pub fn new(bind_addr: impl Into<String>, default_station: Option<String>, store: Option<Arc<dyn TimeSeriesStore>>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            default_station,
            store,
            subscribers: Arc::new(Subscribers { next_id: AtomicU64::new(0), channels: RwLock::new(HashMap::new()) }),
        }
    }
}

struct BroadcastService {
    default_station: Option<String>,
    store: Option<Arc<dyn TimeSeriesStore>>,
    subscribers: Arc<Subscribers>,
}

#[async_trait]
impl WeatherV1 for BroadcastService {
    type GetLiveWeatherStream = tokio_stream::wrappers::ReceiverStream<Result<WeatherReading, Status>>;

    async fn get_latest_reading(&self, request: Request<LatestReq>) -> Result<Response<WeatherReading>, Status> {
        let station = request.into_inner().station_name;
        let store = self.store.as_ref().ok_or_else(|| Status::unavailable("no time-series store configured"))?;
        let bucket = store
            .latest_bucket(&station, BucketResolution::OneMinute)
            .await
            .map_err(|e| Status::internal(e.to_string()))?
            .ok_or_else(|| Status::not_found("no reading for that station"))?;
        Ok(Response::new(WeatherReading::from(&bucket.reading)))
    }

    async fn get_weather_span(&self, request: Request<SpanReq>) -> Result<Response<WeatherSpan>, Status> {
        let req = request.into_inner();
        let store = self.store.as_ref().ok_or_else(|| Status::unavailable("no time-series store configured"))?;
        let readings = store
            .span(&req.station_name, Duration::from_secs(req.duration_seconds))
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(WeatherSpan { readings: readings.iter().map(|b| WeatherReading::from(&b.reading)).collect() }))
    }

    async fn get_live_weather(&self, request: Request<LiveReq>) -> Result<Response<Self::GetLiveWeatherStream>, Status> {
        let requested = request.into_inner().station_name;
        let filter = if requested.is_empty() { self.default_station.clone() } else { Some(requested) };

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.channels.write().await.insert(id, (filter, tx));

        Ok(Response::new(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }

    async fn send_weather_readings(&self, _request: Request<Streaming<WeatherReading>>) -> Result<Response<Empty>, Status> {
        Err(Status::unimplemented("served by the gRPC-receiver ingester"))
    }

    async fn register_remote_station(&self, _request: Request<RemoteStationConfig>) -> Result<Response<RegistrationAck>, Status> {
        Err(Status::unimplemented("served by the gRPC-receiver ingester"))
    }
}

impl GrpcBroadcastSink {
    async fn deliver(&self, reading: &Reading) {
        let wire = WeatherReading::from(reading);
        let mut dead = Vec::new();
        let subs = self.subscribers.channels.read().await;
        for (id, (filter, tx)) in subs.iter() {
            let matches = match filter {
                Some(wanted) => wanted == &reading.station_name,
                None => true,
            };
            if !matches {
                continue;
            }
            if tx.try_send(Ok(wire.clone())).is_err() {
                dead.push(*id);
            }
        }
        drop(subs);

        if !dead.is_empty() {
            let mut subs = self.subscribers.channels.write().await;
            for id in dead {
                debug!(subscriber = id, "dropping disconnected gRPC subscriber");
                subs.remove(&id);
            }
        }
    }
}

#[async_trait]
impl Sink for GrpcBroadcastSink {
    fn kind(&self) -> SinkKind {
        SinkKind::GrpcBroadcast
    }

    async fn start(&self, shutdown: ShutdownHandle, mut rx: ReadingReceiver) {
        let addr = match self.bind_addr.parse() {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "invalid gRPC-broadcast bind address, sink will not run");
                return;
            }
        };
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "failed to bind gRPC-broadcast listener");
                return;
            }
        };

        let service = BroadcastService {
            default_station: self.default_station.clone(),
            store: self.store.clone(),
            subscribers: self.subscribers.clone(),
        };
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
            let server = Server::builder()
                .add_service(WeatherV1Server::new(service))
                .serve_with_incoming_shutdown(incoming, server_shutdown.cancelled());
            if let Err(e) = server.await {
                warn!(error = %e, "gRPC-broadcast server exited with an error");
            }
        });

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                reading = rx.recv() => match reading {
                    Some(r) => self.deliver(&r).await,
                    None => break,
                },
            }
        }

        server_task.abort();
    }

    async fn check_health(&self) -> SinkHealth {
        SinkHealth { status: HealthStatus::Healthy, message: "ok".to_owned(), last_check: Utc::now() }
    }
}

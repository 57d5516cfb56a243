//! The gRPC-receiver ingester: accepts station registrations and streamed
//! readings from upstream stations over the `WeatherV1` service.
//!
//! Binds a `WeatherV1` server exposing `RegisterRemoteStation` and
//! `SendWeatherReadings`; the three read-query RPCs are served by
//! [`crate::broadcast_sink::GrpcBroadcastSink`] instead, since they belong to
//! a different component with a different lifecycle (a consumer of the
//! distributor rather than a producer into it). Session bookkeeping —
//! accept, translate, forward, track `last_seen` — is grounded on
//! `run_session_loop` (`services/receiver/src/session.rs`): a typed core
//! struct owning shared state behind a lock, called from the transport-level
//! handler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use weather_config::ConfigProvider;
use weather_types::{IngestError, Ingester, ReadingSender, RemoteStation, ShutdownHandle};

use crate::proto::weather_v1_server::{WeatherV1, WeatherV1Server};
use crate::proto::{
    Empty, LatestReq, LiveReq, RegistrationAck, RemoteStationConfig, SpanReq, WeatherReading, WeatherSpan,
};

pub struct GrpcReceiverIngester {
    name: String,
    bind_addr: String,
    config: Arc<dyn ConfigProvider>,
}

impl GrpcReceiverIngester {
    pub fn new(name: impl Into<String>, bind_addr: impl Into<String>, config: Arc<dyn ConfigProvider>) -> Self {
        Self { name: name.into(), bind_addr: bind_addr.into(), config }
    }
}

struct ReceiverService {
    config: Arc<dyn ConfigProvider>,
    out: ReadingSender,
}

impl ReceiverService {
    /// Update `last_seen` on the registration matching `station_id`, if one
    /// exists. A reading from an unregistered (or not-yet-registered)
    /// station has nothing to touch — registration is not required for
    /// ingestion (§4.6), only for operator-visible services metadata.
    async fn touch_last_seen(&self, station_id: &str) {
        if station_id.is_empty() {
            return;
        }
        let stations = self.config.remote_stations().await;
        let Some(mut station) = stations.into_iter().find(|s| s.station_id == station_id) else {
            return;
        };
        station.last_seen = Utc::now();
        if let Err(e) = self.config.save_remote_station(station).await {
            warn!(error = %e, station_id, "failed to update last_seen for a remote station");
        }
    }
}

#[async_trait]
impl WeatherV1 for ReceiverService {
    type GetLiveWeatherStream = tokio_stream::wrappers::ReceiverStream<Result<WeatherReading, Status>>;

    async fn get_latest_reading(&self, _request: Request<LatestReq>) -> Result<Response<WeatherReading>, Status> {
        Err(Status::unimplemented("served by the gRPC-stream broadcast sink"))
    }

    async fn get_weather_span(&self, _request: Request<SpanReq>) -> Result<Response<WeatherSpan>, Status> {
        Err(Status::unimplemented("served by the gRPC-stream broadcast sink"))
    }

    async fn get_live_weather(&self, _request: Request<LiveReq>) -> Result<Response<Self::GetLiveWeatherStream>, Status> {
        Err(Status::unimplemented("served by the gRPC-stream broadcast sink"))
    }

    async fn send_weather_readings(&self, request: Request<Streaming<WeatherReading>>) -> Result<Response<Empty>, Status> {
        let mut stream = request.into_inner();
        let mut count: u64 = 0;
        while let Some(wire) = stream.message().await? {
            let station_id = wire.station_id.clone();
            let reading = weather_types::Reading::from(&wire);
            // Registration is not required for ingestion: an unknown
            // station_id is accepted and logged at debug.
            debug!(station = %reading.station_name, "gRPC-receiver accepted reading");
            self.touch_last_seen(&station_id).await;
            if self.out.send(reading).await.is_err() {
                return Err(Status::unavailable("distributor input channel closed"));
            }
            count += 1;
        }
        info!(readings = count, "gRPC-receiver stream closed");
        Ok(Response::new(Empty {}))
    }

    async fn register_remote_station(&self, request: Request<RemoteStationConfig>) -> Result<Response<RegistrationAck>, Status> {
        let config = request.into_inner();
        let station_id = if config.station_id.is_empty() { uuid::Uuid::new_v4().to_string() } else { config.station_id.clone() };

        let station = RemoteStation {
            station_id: station_id.clone(),
            last_seen: Utc::now(),
            timeseries_enabled: config.timeseries_enabled,
            grpc_broadcast_enabled: config.grpc_broadcast_enabled,
        };

        if let Err(e) = self.config.save_remote_station(station).await {
            warn!(error = %e, "failed to persist remote station registration");
            return Ok(Response::new(RegistrationAck {
                station_id,
                success: false,
                message: e.to_string(),
            }));
        }

        Ok(Response::new(RegistrationAck { station_id, success: true, message: "registered".to_owned() }))
    }
}

#[async_trait]
impl Ingester for GrpcReceiverIngester {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let addr = self.bind_addr.parse().map_err(|e| IngestError::Config(format!("invalid bind address: {e}")))?;
        let listener = TcpListener::bind(addr).await.map_err(IngestError::Bind)?;
        let service = ReceiverService { config: self.config.clone(), out };

        tokio::spawn(async move {
            let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
            let server = Server::builder()
                .add_service(WeatherV1Server::new(service))
                .serve_with_incoming_shutdown(incoming, shutdown.cancelled());
            if let Err(e) = server.await {
                warn!(error = %e, "gRPC-receiver server exited with an error");
            }
        });

        Ok(())
    }

    async fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_config::ConfigError;
    use weather_types::{Device, SinkDescriptor};

    struct StubConfig;

    #[async_trait]
    impl ConfigProvider for StubConfig {
        async fn devices(&self) -> Vec<Device> {
            vec![]
        }
        async fn sinks(&self) -> SinkDescriptor {
            SinkDescriptor::default()
        }
        fn subscribe(&self) -> tokio::sync::watch::Receiver<()> {
            tokio::sync::watch::channel(()).1
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

    #[tokio::test]
    async fn register_remote_station_issues_a_fresh_id_when_empty() {
        let service = ReceiverService {
            config: Arc::new(StubConfig),
            out: tokio::sync::mpsc::channel(1).0,
        };
        let ack = service
            .register_remote_station(Request::new(RemoteStationConfig { station_id: String::new(), timeseries_enabled: true, grpc_broadcast_enabled: false }))
            .await
            .unwrap()
            .into_inner();
        assert!(ack.success);
        assert!(!ack.station_id.is_empty());
    }

    #[tokio::test]
    async fn register_remote_station_preserves_a_presented_id() {
        let service = ReceiverService {
            config: Arc::new(StubConfig),
            out: tokio::sync::mpsc::channel(1).0,
        };
        let ack = service
            .register_remote_station(Request::new(RemoteStationConfig { station_id: "existing-id".to_owned(), timeseries_enabled: false, grpc_broadcast_enabled: false }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(ack.station_id, "existing-id");
    }

    struct RecordingConfig {
        stations: std::sync::Mutex<Vec<RemoteStation>>,
    }

    #[async_trait]
    impl ConfigProvider for RecordingConfig {
        async fn devices(&self) -> Vec<Device> {
            vec![]
        }
        async fn sinks(&self) -> SinkDescriptor {
            SinkDescriptor::default()
        }
        fn subscribe(&self) -> tokio::sync::watch::Receiver<()> {
            tokio::sync::watch::channel(()).1
        }
        async fn reload(&self) -> Result<(), ConfigError> {
            Ok(())
        }
        async fn remote_stations(&self) -> Vec<RemoteStation> {
            self.stations.lock().unwrap().clone()
        }
        async fn save_remote_station(&self, station: RemoteStation) -> Result<(), ConfigError> {
            let mut stations = self.stations.lock().unwrap();
            if let Some(existing) = stations.iter_mut().find(|s| s.station_id == station.station_id) {
                *existing = station;
            } else {
                stations.push(station);
            }
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

    #[tokio::test]
    async fn touch_last_seen_updates_the_matching_registration() {
        let original_last_seen = Utc::now() - chrono::Duration::hours(1);
        let config = Arc::new(RecordingConfig {
            stations: std::sync::Mutex::new(vec![RemoteStation {
                station_id: "station-1".to_owned(),
                last_seen: original_last_seen,
                timeseries_enabled: true,
                grpc_broadcast_enabled: false,
            }]),
        });
        let service = ReceiverService { config: config.clone(), out: tokio::sync::mpsc::channel(1).0 };

        service.touch_last_seen("station-1").await;

        let updated = config.remote_stations().await;
        let station = updated.iter().find(|s| s.station_id == "station-1").unwrap();
        assert!(station.last_seen > original_last_seen);
        assert!(station.timeseries_enabled, "touching last_seen must not clobber other fields");
    }

    #[tokio::test]
    async fn touch_last_seen_is_a_noop_for_an_unknown_or_empty_station_id() {
        let config = Arc::new(RecordingConfig { stations: std::sync::Mutex::new(vec![]) });
        let service = ReceiverService { config: config.clone(), out: tokio::sync::mpsc::channel(1).0 };

        service.touch_last_seen("").await;
        service.touch_last_seen("no-such-station").await;

        assert!(config.remote_stations().await.is_empty());
    }
}

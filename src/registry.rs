//! Maps `device.type` strings to the concrete ingester crates.

use std::sync::Arc;

use weather_config::ConfigProvider;
use weather_types::{Device, IngestError, Ingester, Transport};
use weather_supervisor::IngesterRegistry;

fn tcp_bind_addr(device: &Device, device_type: &str) -> Result<String, IngestError> {
    let Transport::Tcp { hostname, port } = &device.transport else {
        return Err(IngestError::Config(format!("{device_type} requires a tcp transport (listen hostname/port)")));
    };
    Ok(format!("{hostname}:{port}"))
}

/// Build the registry of every ingester type this daemon knows how to
/// construct. `config` is only needed by `grpc-receiver`, which persists
/// remote-station registrations through it.
pub fn build(config: Arc<dyn ConfigProvider>) -> IngesterRegistry {
    let mut registry = IngesterRegistry::new();

    registry.register(
        "davis",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_davis::DavisIngester::new(device.clone())?) as Box<dyn Ingester>)
        }),
    );

    registry.register(
        "campbell",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_campbell::CampbellIngester::new(device.clone())?) as Box<dyn Ingester>)
        }),
    );

    registry.register(
        "ambient-http",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_http_ingest::AmbientHttpIngester::from_device(device)?) as Box<dyn Ingester>)
        }),
    );

    registry.register(
        "http-poller",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_http_ingest::GenericHttpPoller::from_device(device)?) as Box<dyn Ingester>)
        }),
    );

    registry.register(
        "snow-gauge",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_http_ingest::SnowGaugePoller::from_device(device)?) as Box<dyn Ingester>)
        }),
    );

    registry.register(
        "airgradient",
        Arc::new(|device: &Device| {
            Ok(Box::new(weather_http_ingest::AirGradientPoller::from_device(device)?) as Box<dyn Ingester>)
        }),
    );

    registry.register("grpc-receiver", {
        let config = config.clone();
        Arc::new(move |device: &Device| {
            let bind_addr = tcp_bind_addr(device, "grpc-receiver")?;
            Ok(Box::new(weather_grpc::GrpcReceiverIngester::new(device.name.clone(), bind_addr, config.clone())) as Box<dyn Ingester>)
        })
    });

    registry
}

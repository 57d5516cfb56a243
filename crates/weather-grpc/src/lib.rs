//! The gRPC subsystem: a `WeatherV1` service split across three components
//! — an inbound ingester, a broadcast sink, and an outbound client sink —
//! sharing one generated protocol module.

pub mod proto {
    tonic::include_proto!("remoteweather.v1");
}

mod broadcast_sink;
mod client_sink;
mod convert;
mod receiver;

pub use broadcast_sink::GrpcBroadcastSink;
pub use client_sink::{GrpcClientSink, BACKOFF_MAX, BACKOFF_MIN, STATE_CHECK_INTERVAL};
pub use receiver::GrpcReceiverIngester;

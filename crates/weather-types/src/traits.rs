//! Capability traits shared by every ingester and sink.
//!
//! Both are modeled as capability sets: every ingester exposes
//! `name`/`start`/`stop`, and every sink implements `start`/`check_health`.
//! This module fixes the trait shapes so `weather-supervisor` can hold a
//! registry of `Box<dyn Ingester>` and the sink manager a `Vec<Box<dyn Sink>>`
//! without knowing the concrete protocol underneath — the same
//! dynamic-dispatch-over-a-small-interface shape the teacher pack uses for
//! `JournalAccess` (swap a real journal for a no-op one behind a trait
//! object).

use crate::reading::Reading;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Every task observes one shutdown token, rooted at startup.
pub type ShutdownHandle = CancellationToken;

/// The distributor's input side, as seen by an ingester.
pub type ReadingSender = tokio::sync::mpsc::Sender<Reading>;
/// One sink's delivery channel, as seen by a sink task.
pub type ReadingReceiver = tokio::sync::mpsc::Receiver<Reading>;

/// A device-facing component that produces `Reading`s.
///
/// `start` must return once the ingester's task has been spawned (it must
/// not block waiting for the device's first reading).
/// `stop` must be idempotent and return promptly; the supervisor will not
/// wait past its grace period.
#[async_trait]
pub trait Ingester: Send + Sync {
    /// The configured device name this ingester was built from.
    fn name(&self) -> &str;

    /// Spawn the ingester's background task(s) and return immediately.
    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError>;

    /// Request shutdown and wait for internal cleanup. Idempotent.
    async fn stop(&self);
}

/// Which kind of sink a health record or descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    TimeSeries,
    GrpcBroadcast,
    GrpcClient,
    Aprs,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SinkKind::TimeSeries => "timeseries",
            SinkKind::GrpcBroadcast => "grpc-broadcast",
            SinkKind::GrpcClient => "grpc-client",
            SinkKind::Aprs => "aprs",
        };
        write!(f, "{s}")
    }
}

/// The result of one `check_health()` probe.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkHealth {
    pub status: HealthStatus,
    pub message: String,
    pub last_check: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// A consumer of `Reading`s registered with the distributor.
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Drive the sink's consume loop until `shutdown` fires or `rx` closes.
    async fn start(&self, shutdown: ShutdownHandle, rx: ReadingReceiver);

    /// Probe liveness. Must never block longer than a few seconds and must
    /// never panic — a failing probe reports `Unhealthy`, it does not
    /// propagate an error, and does not restart the sink.
    async fn check_health(&self) -> SinkHealth;
}

/// Errors an `Ingester::start` may return. Only *configuration* errors
/// propagate up to the supervisor — transient I/O is resolved internally by
/// reconnect and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

//! The Davis VantagePro ingester: the state machine that takes a console
//! from connect through the wake handshake, LOOP framing, CRC-checked
//! packets, and reconnect on failure.
//!
//! Grounded on `ipico-core::read::ChipRead`'s validate-then-parse shape for
//! the packet-level work (`packet.rs`); the connect/retry loop generalizes
//! the teacher's repeated "dial, sleep-with-cancellation on failure, retry"
//! pattern (no single teacher file owns a state machine this shape — Davis
//! is the one subsystem with no close teacher analogue, called out as such
//! in `DESIGN.md`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weather_types::{Device, IngestError, Ingester, Reading, ReadingSender, ShutdownHandle};

use crate::packet::{self, PacketError, RawLoopPacket};
use crate::transport::{self, AnyStream, DialError};

const WAKE_ATTEMPTS: u32 = 3;
const WAKE_INTER_BYTE_WAIT: Duration = Duration::from_millis(1200);
const ACK_TIMEOUT: Duration = Duration::from_secs(2);
const NACK_RETRIES: u32 = 3;
const DEFAULT_CRC_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RAIN_BUCKET_SIZE: f64 = 0.01;
const DEFAULT_LOOP_COUNT: u32 = 20;

#[derive(Debug, thiserror::Error)]
enum DavisError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("console did not wake")]
    NoWake,
    #[error("console NACKed the loop command {0} times")]
    Nacked(u32),
    #[error("{0} consecutive CRC failures, forcing reconnect")]
    TooManyCrcFailures(u32),
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error("shutdown requested")]
    Cancelled,
}

struct Settings {
    rain_bucket_size: f64,
    crc_failure_threshold: u32,
    loop_count: u32,
}

impl Settings {
    fn from_device(device: &Device) -> Self {
        Settings {
            rain_bucket_size: device
                .options
                .get("rain_bucket_size")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RAIN_BUCKET_SIZE),
            crc_failure_threshold: device
                .options
                .get("crc_failure_threshold")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CRC_FAILURE_THRESHOLD),
            loop_count: device
                .options
                .get("loop_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LOOP_COUNT),
        }
    }
}

pub struct DavisIngester {
    device: Device,
    settings: Settings,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DavisIngester {
    pub fn new(device: Device) -> Result<Self, IngestError> {
        device.validate().map_err(|e| IngestError::Config(e.to_string()))?;
        let settings = Settings::from_device(&device);
        Ok(Self { device, settings: settings_or_reject(settings)?, task: Mutex::new(None) })
    }
}

fn settings_or_reject(settings: Settings) -> Result<Settings, IngestError> {
    if !(1..=2048).contains(&settings.loop_count) {
        return Err(IngestError::Config(format!(
            "loop_count must be in 1..=2048, got {}",
            settings.loop_count
        )));
    }
    Ok(settings)
}

#[async_trait]
impl Ingester for DavisIngester {
    fn name(&self) -> &str {
        &self.device.name
    }

    async fn start(&self, ctx: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let device = self.device.clone();
        let rain_bucket_size = self.settings.rain_bucket_size;
        let crc_failure_threshold = self.settings.crc_failure_threshold;
        let loop_count = self.settings.loop_count;

        let handle = tokio::spawn(async move {
            run(device, rain_bucket_size, crc_failure_threshold, loop_count, ctx, out).await;
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run(
    device: Device,
    rain_bucket_size: f64,
    crc_failure_threshold: u32,
    loop_count: u32,
    shutdown: CancellationToken,
    out: ReadingSender,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match run_one_connection(&device, rain_bucket_size, crc_failure_threshold, loop_count, &shutdown, &out).await {
            Ok(()) | Err(DavisError::Cancelled) => return,
            Err(e) => {
                warn!(device = %device.name, error = %e, "davis connection ended, reconnecting");
                let delay = transport::reconnect_delay(&device.transport);
                if !transport::sleep_cancellable(delay, &shutdown).await {
                    return;
                }
            }
        }
    }
}

/// Drive exactly one connection attempt end to end: dial, wake, then loop
/// requesting and reading packets forever (until an error or shutdown).
async fn run_one_connection(
    device: &Device,
    rain_bucket_size: f64,
    crc_failure_threshold: u32,
    loop_count: u32,
    shutdown: &CancellationToken,
    out: &ReadingSender,
) -> Result<(), DavisError> {
    let mut stream = select_cancellable(transport::dial(&device.transport), shutdown)
        .await?
        .map_err(DavisError::from)?;

    wake(&mut stream, shutdown).await?;
    info!(device = %device.name, "davis console awake");

    let mut crc_failures: u32 = 0;
    loop {
        request_loop(&mut stream, loop_count, shutdown).await?;

        for _ in 0..loop_count {
            let mut buf = [0u8; packet::PACKET_LEN];
            read_exact_cancellable(&mut stream, &mut buf, transport::READ_DEADLINE, shutdown).await?;

            match packet::parse(&buf) {
                Ok(raw) => {
                    crc_failures = 0;
                    emit(raw, device, rain_bucket_size, out).await;
                }
                Err(PacketError::CrcMismatch { .. }) => {
                    crc_failures += 1;
                    debug!(device = %device.name, failures = crc_failures, "davis crc mismatch");
                    if crc_failures >= crc_failure_threshold {
                        return Err(DavisError::TooManyCrcFailures(crc_failures));
                    }
                }
                Err(e) => {
                    debug!(device = %device.name, error = %e, "davis packet rejected");
                }
            }
        }
    }
}

async fn emit(raw: RawLoopPacket, device: &Device, rain_bucket_size: f64, out: &ReadingSender) {
    let reading: Reading = raw.into_reading(&device.name, device.wind_dir_correction, rain_bucket_size, Utc::now());
    if out.send(reading).await.is_err() {
        debug!(device = %device.name, "distributor input closed, dropping reading");
    }
}

/// Send up to [`WAKE_ATTEMPTS`] wake bytes, `WAKE_INTER_BYTE_WAIT` apart,
/// watching for the `\n\r` wake reply after each one.
async fn wake(stream: &mut AnyStream, shutdown: &CancellationToken) -> Result<(), DavisError> {
    for _ in 0..WAKE_ATTEMPTS {
        stream.write_all(b"\n").await?;
        let mut buf = [0u8; 2];
        match read_exact_cancellable(stream, &mut buf, WAKE_INTER_BYTE_WAIT, shutdown).await {
            Ok(()) if buf == *b"\n\r" => return Ok(()),
            Err(DavisError::Cancelled) => return Err(DavisError::Cancelled),
            _ => continue,
        }
    }
    Err(DavisError::NoWake)
}

/// Send `LOOP <n>\n`, retrying on NACK up to [`NACK_RETRIES`] times, falling
/// back to the legacy `LPS 2 1\n` command if `LOOP` is never ACKed.
async fn request_loop(stream: &mut AnyStream, n: u32, shutdown: &CancellationToken) -> Result<(), DavisError> {
    if try_command(stream, format!("LOOP {n}\n").as_bytes(), shutdown).await? {
        return Ok(());
    }
    if try_command(stream, b"LPS 2 1\n", shutdown).await? {
        return Ok(());
    }
    Err(DavisError::Nacked(NACK_RETRIES))
}

async fn try_command(stream: &mut AnyStream, command: &[u8], shutdown: &CancellationToken) -> Result<bool, DavisError> {
    for _ in 0..NACK_RETRIES {
        stream.write_all(command).await?;
        let mut ack = [0u8; 1];
        read_exact_cancellable(stream, &mut ack, ACK_TIMEOUT, shutdown).await?;
        match ack[0] {
            0x06 => return Ok(true),
            0x15 => continue,
            _ => continue,
        }
    }
    Ok(false)
}

async fn read_exact_cancellable(
    stream: &mut AnyStream,
    buf: &mut [u8],
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(), DavisError> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(DavisError::Cancelled),
        result = tokio::time::timeout(timeout, stream.read_exact(buf)) => {
            match result {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(DavisError::Io(e)),
                Err(_) => Err(DavisError::Timeout),
            }
        }
    }
}

async fn select_cancellable<T>(fut: impl std::future::Future<Output = T>, shutdown: &CancellationToken) -> Result<T, DavisError> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(DavisError::Cancelled),
        value = fut => Ok(value),
    }
}

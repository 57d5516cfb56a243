//! The Campbell Scientific ingester: newline-delimited JSON over serial or
//! TCP, with reconnection shared with the Davis ingester.

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weather_davis::transport::{self, AnyStream};
use weather_types::{Device, IngestError, Ingester, ReadingSender, ShutdownHandle};

use crate::record::CampbellRecord;
use crate::solar::clear_sky_potential_watts;

pub struct CampbellIngester {
    device: Device,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CampbellIngester {
    pub fn new(device: Device) -> Result<Self, IngestError> {
        device.validate().map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(Self { device, task: Mutex::new(None) })
    }
}

#[async_trait::async_trait]
impl Ingester for CampbellIngester {
    fn name(&self) -> &str {
        &self.device.name
    }

    async fn start(&self, ctx: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let device = self.device.clone();
        let handle = tokio::spawn(async move {
            run(device, ctx, out).await;
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

async fn run(device: Device, shutdown: CancellationToken, out: ReadingSender) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match run_one_connection(&device, &shutdown, &out).await {
            true => return,
            false => {
                let delay = transport::reconnect_delay(&device.transport);
                if !transport::sleep_cancellable(delay, &shutdown).await {
                    return;
                }
            }
        }
    }
}

/// Returns `true` if shutdown was observed (caller should exit for good).
async fn run_one_connection(device: &Device, shutdown: &CancellationToken, out: &ReadingSender) -> bool {
    let stream = tokio::select! {
        biased;
        () = shutdown.cancelled() => return true,
        dialed = transport::dial(&device.transport) => match dialed {
            Ok(s) => s,
            Err(e) => {
                warn!(device = %device.name, error = %e, "campbell dial failed");
                return false;
            }
        },
    };

    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            biased;
            () = shutdown.cancelled() => return true,
            result = tokio::time::timeout(transport::READ_DEADLINE, lines.next_line()) => result,
        };

        let line = match line {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                debug!(device = %device.name, "campbell connection closed by peer");
                return false;
            }
            Ok(Err(e)) => {
                warn!(device = %device.name, error = %e, "campbell read error");
                return false;
            }
            Err(_) => {
                warn!(device = %device.name, "campbell read deadline expired");
                return false;
            }
        };

        let record: CampbellRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                debug!(device = %device.name, error = %e, "campbell record rejected");
                continue;
            }
        };

        let now = Utc::now();
        let mut reading = record.into_reading(&device.name, device.wind_dir_correction, now);
        if let Some(location) = &device.location {
            reading.potential_solar_watts = clear_sky_potential_watts(location, now);
        }

        if out.send(reading).await.is_err() {
            debug!(device = %device.name, "distributor input closed, dropping reading");
        }
    }
}

// AnyStream must be Unpin for BufReader::lines(); tokio_serial's SerialStream
// and TcpStream are both Unpin, and the enum inherits that automatically.
const _: fn() = || {
    fn assert_unpin<T: Unpin>() {}
    assert_unpin::<AnyStream>();
};

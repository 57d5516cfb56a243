//! The APRS-IS sink: holds the latest reading per enabled station and, on a
//! 5-minute cadence (plus once at startup once a reading has arrived),
//! dials APRS-IS and sends one compressed weather report.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use weather_types::{GeoLocation, HealthStatus, Reading, ReadingReceiver, ShutdownHandle, Sink, SinkHealth, SinkKind};

use crate::encode::build_weather_report;
use crate::passcode::passcode;

/// Report cadence: one compressed weather report every five minutes.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Timeout for the whole dial/login/send exchange.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(3);

/// One APRS-IS enabled station: its callsign/SSID and the location used to
/// compute the compressed position.
#[derive(Debug, Clone)]
pub struct AprsStation {
    pub station_name: String,
    pub callsign: String,
    pub ssid: Option<u8>,
    pub location: GeoLocation,
}

#[derive(Debug, thiserror::Error)]
pub enum AprsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out talking to the APRS-IS server")]
    Timeout,
    #[error("server banner did not start with '#'")]
    BadBanner,
    #[error("login was not verified")]
    LoginNotVerified,
}

pub struct AprsSink {
    server_addr: String,
    software_version: String,
    stations: Vec<AprsStation>,
    latest: RwLock<HashMap<String, Reading>>,
}

impl AprsSink {
    pub fn new(server_addr: impl Into<String>, software_version: impl Into<String>, stations: Vec<AprsStation>) -> Self {
        Self {
            server_addr: server_addr.into(),
            software_version: software_version.into(),
            stations,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Record the latest reading for whichever station it belongs to, if
    /// that station has APRS enabled. Returns `true` when this was the very
    /// first reading recorded for any station — the caller uses that to emit
    /// the startup report immediately instead of waiting for the next
    /// 5-minute tick.
    async fn record(&self, reading: Reading) -> bool {
        if self.stations.iter().any(|s| s.station_name == reading.station_name) {
            let mut latest = self.latest.write().await;
            let is_first_ever = latest.is_empty();
            latest.insert(reading.station_name.clone(), reading);
            is_first_ever
        } else {
            false
        }
    }

    async fn send_all_reports(&self) {
        let snapshot: Vec<(AprsStation, Reading)> = {
            let latest = self.latest.read().await;
            self.stations
                .iter()
                .filter_map(|s| latest.get(&s.station_name).map(|r| (s.clone(), r.clone())))
                .collect()
        };

        for (station, reading) in snapshot {
            let packet = build_weather_report(&station.callsign, station.ssid, &station.location, &reading);
            match send_report(&self.server_addr, &station.callsign, &self.software_version, &packet).await {
                Ok(()) => info!(station = %station.station_name, "aprs report sent"),
                Err(e) => warn!(station = %station.station_name, error = %e, "aprs report failed"),
            }
        }
    }
}

async fn send_report(server_addr: &str, callsign: &str, software_version: &str, packet: &str) -> Result<(), AprsError> {
    tokio::time::timeout(EXCHANGE_TIMEOUT, send_report_inner(server_addr, callsign, software_version, packet))
        .await
        .map_err(|_| AprsError::Timeout)?
}

async fn send_report_inner(server_addr: &str, callsign: &str, software_version: &str, packet: &str) -> Result<(), AprsError> {
    let stream = TcpStream::connect(server_addr).await?;
    let mut reader = BufReader::new(stream);

    let mut banner = String::new();
    reader.read_line_like(&mut banner).await?;
    if !banner.starts_with('#') {
        return Err(AprsError::BadBanner);
    }

    let pass = passcode(callsign);
    let login = format!("user {callsign} pass {pass} vers remoteweather-{software_version}\r\n");
    reader.get_mut().write_all(login.as_bytes()).await?;

    let mut reply = String::new();
    reader.read_line_like(&mut reply).await?;
    if !reply.contains("verified") {
        return Err(AprsError::LoginNotVerified);
    }

    reader.get_mut().write_all(packet.as_bytes()).await?;
    reader.get_mut().shutdown().await?;
    Ok(())
}

/// A tiny hand-rolled `read_line` over a `BufReader<TcpStream>`, since
/// `AsyncBufReadExt::read_line` would pull in the full buffered-reader trait
/// surface for what is, here, a two-line exchange.
trait ReadLineLike {
    async fn read_line_like(&mut self, out: &mut String) -> std::io::Result<()>;
}

impl ReadLineLike for BufReader<TcpStream> {
    async fn read_line_like(&mut self, out: &mut String) -> std::io::Result<()> {
        use tokio::io::AsyncBufReadExt;
        self.read_line(out).await?;
        Ok(())
    }
}

#[async_trait]
impl Sink for AprsSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Aprs
    }

    async fn start(&self, shutdown: ShutdownHandle, mut rx: ReadingReceiver) {
        let mut ticker = tokio::time::interval(REPORT_INTERVAL);
        // The first tick fires immediately; skip it so the first real report
        // only goes out once a reading has arrived — with no reading yet there
        // is nothing to send.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                reading = rx.recv() => match reading {
                    Some(r) => {
                        debug!(station = %r.station_name, "aprs sink recorded reading");
                        if self.record(r).await {
                            info!("aprs sink sending its first report immediately, not waiting for the next tick");
                            self.send_all_reports().await;
                            ticker.reset();
                        }
                    }
                    None => return,
                },
                _ = ticker.tick() => {
                    self.send_all_reports().await;
                }
            }
        }
    }

    async fn check_health(&self) -> SinkHealth {
        let has_data = !self.latest.read().await.is_empty();
        SinkHealth {
            status: HealthStatus::Healthy,
            message: if has_data { "has recent reading".to_owned() } else { "no reading yet".to_owned() },
            last_check: Utc::now(),
        }
    }
}

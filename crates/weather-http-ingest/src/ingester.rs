//! The Ambient-HTTP push ingester: a single-path `GET` listener,
//! hand-rolled the way `status_http.rs` is, generalized from a fixed set
//! of literal paths to query-string sensor parsing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use weather_types::{correct_wind_dir, Device, IngestError, Ingester, Reading, ReadingSender, ShutdownHandle, Transport};

use crate::fields::{apply_fields, parse_query};
use crate::formulas::{apparent_heat_index, apparent_wind_chill};
use crate::rain_tracker::RainTracker;

const MAX_REQUEST_BYTES: usize = 8192;

pub struct AmbientHttpIngester {
    name: String,
    bind_addr: String,
    path: String,
    wind_dir_correction: i32,
    rain_tracker: Arc<RainTracker>,
}

impl AmbientHttpIngester {
    /// Build from a validated [`Device`]. The listen path defaults to `/`
    /// and may be overridden via `device.options["path"]`.
    pub fn from_device(device: &Device) -> Result<Self, IngestError> {
        let Transport::Tcp { hostname, port } = &device.transport else {
            return Err(IngestError::Config("ambient-http requires a tcp transport (listen hostname/port)".to_owned()));
        };
        let path = device.options.get("path").cloned().unwrap_or_else(|| "/".to_owned());

        Ok(Self {
            name: device.name.clone(),
            bind_addr: format!("{hostname}:{port}"),
            path,
            wind_dir_correction: device.wind_dir_correction,
            rain_tracker: Arc::new(RainTracker::new()),
        })
    }
}

#[async_trait]
impl Ingester for AmbientHttpIngester {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let listener = TcpListener::bind(&self.bind_addr).await.map_err(IngestError::Bind)?;
        let path = self.path.clone();
        let wind_dir_correction = self.wind_dir_correction;
        let rain_tracker = self.rain_tracker.clone();
        let station_name = self.name.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let out = out.clone();
                        let path = path.clone();
                        let rain_tracker = rain_tracker.clone();
                        let station_name = station_name.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, &path, wind_dir_correction, &rain_tracker, &station_name, out).await;
                        });
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {}
}

async fn handle_connection(
    mut stream: TcpStream,
    expected_path: &str,
    wind_dir_correction: i32,
    rain_tracker: &RainTracker,
    station_name: &str,
    out: ReadingSender,
) {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = match stream.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        send_response(&mut stream, 400, "bad request").await;
        return;
    };
    let Some(first_line) = request.lines().next() else {
        send_response(&mut stream, 400, "bad request").await;
        return;
    };

    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");

    if method != "GET" {
        send_response(&mut stream, 405, "method not allowed").await;
        return;
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != expected_path {
        send_response(&mut stream, 404, "not found").await;
        return;
    }

    let fields = parse_query(query);

    let Some(id) = fields.get("id") else {
        send_response(&mut stream, 400, "missing ID").await;
        return;
    };
    if fields.get("password").is_none() {
        send_response(&mut stream, 400, "missing PASSWORD").await;
        return;
    }
    let Some(dateutc) = fields.get("dateutc") else {
        send_response(&mut stream, 400, "missing dateutc").await;
        return;
    };
    if fields.get("action").map(String::as_str) != Some("updateraw") {
        send_response(&mut stream, 400, "missing action=updateraw").await;
        return;
    }
    let Ok(naive) = NaiveDateTime::parse_from_str(dateutc, "%Y-%m-%d %H:%M:%S") else {
        send_response(&mut stream, 400, "invalid dateutc").await;
        return;
    };
    let timestamp = Utc.from_utc_datetime(&naive);

    let mut reading = Reading::new(station_name, "ambient-http", timestamp);
    apply_fields(&mut reading, &fields);
    reading.wind_dir = correct_wind_dir(reading.wind_dir, wind_dir_correction);

    if let Some(total) = fields.get("totalrainin").and_then(|v| v.parse::<f64>().ok()) {
        reading.rain_incremental = rain_tracker.increment(station_name, total);
    }

    reading.wind_chill = apparent_wind_chill(reading.outside_temperature, reading.wind_speed);
    reading.heat_index = apparent_heat_index(reading.outside_temperature, reading.outside_humidity);

    debug!(station = %id, "ambient-http accepted sample");
    if out.send(reading).await.is_err() {
        warn!("distributor input channel closed; dropping ambient-http sample");
    }

    send_response(&mut stream, 200, "success").await;
}

async fn send_response(stream: &mut TcpStream, status: u16, body: &str) {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {status_text}\r\nContent-Type: text/plain\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        len = body.len(),
    );
    let _ = stream.write_all(response.as_bytes()).await;
}

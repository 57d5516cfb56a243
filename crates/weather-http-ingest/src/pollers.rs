//! Supplemental HTTP-GET pollers: a generic JSON poller, a snow-gauge
//! poller, and an AirGradient poller, rounding out the heterogeneous set of
//! field devices this daemon ingests from; grounded on the
//! `reqwest::Client` builder-with-timeout pattern in
//! `services/receiver/src/control_api.rs`'s `fetch_server_streams`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use weather_types::{Device, IngestError, Ingester, Reading, ReadingSender, ShutdownHandle};

use crate::fields::apply_fields;

const POLL_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn json_to_string_map(value: &Value) -> HashMap<String, String> {
    let Some(obj) = value.as_object() else { return HashMap::new() };
    obj.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.to_ascii_lowercase(), s))
        })
        .collect()
}

/// Polls an arbitrary JSON endpoint on a fixed interval and maps its object
/// keys through the same recognized-sensor-key table the Ambient-HTTP
/// ingester uses.
pub struct GenericHttpPoller {
    name: String,
    url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl GenericHttpPoller {
    pub fn from_device(device: &Device) -> Result<Self, IngestError> {
        let url = device
            .options
            .get("url")
            .cloned()
            .ok_or_else(|| IngestError::Config("generic-http-poller requires options.url".to_owned()))?;
        let interval_secs: u64 = device
            .options
            .get("interval_seconds")
            .map(|v| v.parse().map_err(|_| IngestError::Config("interval_seconds must be an integer".to_owned())))
            .transpose()?
            .unwrap_or(60);

        let client = reqwest::Client::builder()
            .timeout(POLL_HTTP_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client error: {e}")))?;

        Ok(Self { name: device.name.clone(), url, interval: Duration::from_secs(interval_secs), client })
    }
}

#[async_trait]
impl Ingester for GenericHttpPoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let name = self.name.clone();
        let url = self.url.clone();
        let client = self.client.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        match fetch_and_parse(&client, &url).await {
                            Ok(fields) => {
                                let mut reading = Reading::new(&name, "generic-http-poller", Utc::now());
                                apply_fields(&mut reading, &fields);
                                if out.send(reading).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!(station = %name, error = %e, "generic-http-poller fetch failed"),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {}
}

async fn fetch_and_parse(client: &reqwest::Client, url: &str) -> Result<HashMap<String, String>, reqwest::Error> {
    let body: Value = client.get(url).send().await?.json().await?;
    Ok(json_to_string_map(&body))
}

/// Polls a snow-depth gauge's HTTP endpoint (expected JSON `{"distance_mm":
/// ...}`) and derives `snow_depth` from the configured baseline distance.
pub struct SnowGaugePoller {
    name: String,
    url: String,
    base_snow_distance_mm: f64,
    client: reqwest::Client,
}

impl SnowGaugePoller {
    pub fn from_device(device: &Device) -> Result<Self, IngestError> {
        let url = device
            .options
            .get("url")
            .cloned()
            .ok_or_else(|| IngestError::Config("snow-gauge requires options.url".to_owned()))?;
        let base_snow_distance_mm = device.base_snow_distance.unwrap_or(0.0);
        let client = reqwest::Client::builder()
            .timeout(POLL_HTTP_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self { name: device.name.clone(), url, base_snow_distance_mm, client })
    }
}

#[async_trait]
impl Ingester for SnowGaugePoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let name = self.name.clone();
        let url = self.url.clone();
        let client = self.client.clone();
        let base = self.base_snow_distance_mm;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        match client.get(&url).send().await.and_then(reqwest::Response::error_for_status) {
                            Ok(resp) => match resp.json::<Value>().await {
                                Ok(body) => {
                                    let Some(distance_mm) = body.get("distance_mm").and_then(Value::as_f64) else { continue };
                                    let mut reading = Reading::new(&name, "snow-gauge", Utc::now());
                                    reading.snow_distance = distance_mm;
                                    reading.snow_depth = (base - distance_mm).max(0.0);
                                    if out.send(reading).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!(station = %name, error = %e, "snow-gauge response decode failed"),
                            },
                            Err(e) => warn!(station = %name, error = %e, "snow-gauge fetch failed"),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {}
}

/// Polls an AirGradient local-API endpoint (JSON with `pm02`, `rco2`,
/// `atmp`, `rhum`) and maps it onto the air-quality/temperature/humidity
/// fields.
pub struct AirGradientPoller {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl AirGradientPoller {
    pub fn from_device(device: &Device) -> Result<Self, IngestError> {
        let url = device
            .options
            .get("url")
            .cloned()
            .ok_or_else(|| IngestError::Config("airgradient requires options.url".to_owned()))?;
        let client = reqwest::Client::builder()
            .timeout(POLL_HTTP_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self { name: device.name.clone(), url, client })
    }
}

#[async_trait]
impl Ingester for AirGradientPoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: ShutdownHandle, out: ReadingSender) -> Result<(), IngestError> {
        let name = self.name.clone();
        let url = self.url.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        match client.get(&url).send().await.and_then(reqwest::Response::error_for_status) {
                            Ok(resp) => match resp.json::<Value>().await {
                                Ok(body) => {
                                    let mut reading = Reading::new(&name, "airgradient", Utc::now());
                                    if let Some(v) = body.get("pm02").and_then(Value::as_f64) {
                                        reading.pm25 = v;
                                    }
                                    if let Some(v) = body.get("rco2").and_then(Value::as_f64) {
                                        reading.co2 = v;
                                    }
                                    if let Some(v) = body.get("atmp").and_then(Value::as_f64) {
                                        reading.outside_temperature = v * 9.0 / 5.0 + 32.0;
                                    }
                                    if let Some(v) = body.get("rhum").and_then(Value::as_f64) {
                                        reading.outside_humidity = v;
                                    }
                                    if out.send(reading).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!(station = %name, error = %e, "airgradient response decode failed"),
                            },
                            Err(e) => warn!(station = %name, error = %e, "airgradient fetch failed"),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_string_map_lowercases_keys_and_stringifies_numbers() {
        let value = serde_json::json!({"tempF": 72.5, "ID": "k1"});
        let map = json_to_string_map(&value);
        assert_eq!(map.get("tempf").unwrap(), "72.5");
        assert_eq!(map.get("id").unwrap(), "k1");
    }

    #[test]
    fn json_to_string_map_is_empty_for_a_non_object_value() {
        let value = serde_json::json!([1, 2, 3]);
        assert!(json_to_string_map(&value).is_empty());
    }
}

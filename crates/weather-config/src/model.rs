//! TOML configuration schema.
//!
//! Mirrors the teacher's `forwarder::config` shape: a `Raw*` deserialization
//! layer with `Option` fields so every field can be omitted, and a validating
//! loader that fills defaults and rejects invalid combinations. TOML is the
//! sole configuration syntax; there is no environment-variable override
//! layer (same choice the teacher made).

use serde::Deserialize;
use std::collections::HashMap;
use weather_types::{Device, GeoLocation, SinkDescriptor, Transport, UploadServiceConfig};

#[derive(Debug, Deserialize)]
pub(crate) struct RawConfig {
    pub(crate) schema_version: Option<u32>,
    pub(crate) sinks: Option<RawSinks>,
    pub(crate) device: Option<Vec<RawDevice>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSinks {
    timeseries_enabled: Option<bool>,
    grpc_broadcast_enabled: Option<bool>,
    grpc_broadcast_bind: Option<String>,
    grpc_client_enabled: Option<bool>,
    grpc_client_upstream_url: Option<String>,
    aprs_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDevice {
    name: Option<String>,
    #[serde(rename = "type")]
    device_type: Option<String>,
    serial_device: Option<String>,
    baud: Option<u32>,
    hostname: Option<String>,
    port: Option<u16>,
    wind_dir_correction: Option<i32>,
    base_snow_distance: Option<f64>,
    lat: Option<f64>,
    lon: Option<f64>,
    altitude: Option<f64>,
    snow_enabled: Option<bool>,
    #[serde(default)]
    uploads: HashMap<String, RawUpload>,
    /// Any device-table key not named above lands here and becomes a
    /// [`weather_types::Device::options`] entry, stringified.
    #[serde(flatten)]
    extra: HashMap<String, toml::Value>,
}

fn stringify_toml_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        // Arrays/tables aren't a supported option shape; ignored rather than
        // rejected, so an operator's typo in a nested table doesn't fail
        // the whole config load.
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUpload {
    enabled: Option<bool>,
    station_id: Option<String>,
    api_key: Option<String>,
    interval_seconds: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Parse and validate a TOML document into the typed model.
///
/// Validation rules:
/// - every device needs a unique, non-empty `name`;
/// - transport is serial XOR TCP, never both or neither;
/// - `wind_dir_correction` (when present) is in `[-359, 359]`.
pub(crate) fn parse(toml_str: &str) -> Result<(Vec<Device>, SinkDescriptor), ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let schema_version = raw.schema_version.unwrap_or(1);
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let sinks = match raw.sinks {
        Some(s) => SinkDescriptor {
            timeseries_enabled: s.timeseries_enabled.unwrap_or(true),
            grpc_broadcast_enabled: s.grpc_broadcast_enabled.unwrap_or(false),
            grpc_broadcast_bind: s.grpc_broadcast_bind,
            grpc_client_enabled: s.grpc_client_enabled.unwrap_or(false),
            grpc_client_upstream_url: s.grpc_client_upstream_url,
            aprs_enabled: s.aprs_enabled.unwrap_or(false),
        },
        None => SinkDescriptor {
            timeseries_enabled: true,
            ..Default::default()
        },
    };

    let raw_devices = raw.device.unwrap_or_default();
    let mut seen_names = std::collections::HashSet::new();
    let mut devices = Vec::with_capacity(raw_devices.len());
    for (i, d) in raw_devices.into_iter().enumerate() {
        let name = d
            .name
            .ok_or_else(|| ConfigError::MissingField(format!("device[{i}].name")))?;
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!("device[{i}].name must not be empty")));
        }
        if !seen_names.insert(name.clone()) {
            return Err(ConfigError::InvalidValue(format!("duplicate device name '{name}'")));
        }
        let device_type = d
            .device_type
            .ok_or_else(|| ConfigError::MissingField(format!("device[{i}].type")))?;

        let transport = match (d.serial_device, d.hostname) {
            (Some(device), None) => Transport::Serial {
                device,
                baud: d.baud.unwrap_or(19200),
            },
            (None, Some(hostname)) => Transport::Tcp {
                hostname,
                port: d.port.ok_or_else(|| ConfigError::MissingField(format!("device[{i}].port")))?,
            },
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue(format!(
                    "device '{name}' sets both serial_device and hostname; they are mutually exclusive"
                )));
            }
            (None, None) => {
                return Err(ConfigError::MissingField(format!(
                    "device '{name}' needs either serial_device or hostname"
                )));
            }
        };

        let wind_dir_correction = d.wind_dir_correction.unwrap_or(0);
        if !(-359..=359).contains(&wind_dir_correction) {
            return Err(ConfigError::InvalidValue(format!(
                "device '{name}' wind_dir_correction {wind_dir_correction} out of range [-359, 359]"
            )));
        }

        let location = match (d.lat, d.lon, d.altitude) {
            (Some(lat), Some(lon), Some(altitude)) => Some(GeoLocation { lat, lon, altitude }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "device '{name}' location requires lat, lon, and altitude together"
                )));
            }
        };

        let mut uploads = HashMap::new();
        for (service, u) in d.uploads {
            uploads.insert(
                service,
                UploadServiceConfig {
                    enabled: u.enabled.unwrap_or(false),
                    station_id: u.station_id.unwrap_or_default(),
                    api_key: u.api_key.unwrap_or_default(),
                    interval_seconds: u.interval_seconds,
                },
            );
        }

        let options = d
            .extra
            .iter()
            .filter_map(|(k, v)| stringify_toml_value(v).map(|v| (k.clone(), v)))
            .collect();

        devices.push(Device {
            name,
            device_type,
            transport,
            wind_dir_correction,
            base_snow_distance: d.base_snow_distance,
            location,
            snow_enabled: d.snow_enabled.unwrap_or(false),
            uploads,
            options,
        });
    }

    Ok((devices, sinks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_both_transports() {
        let toml = r#"
            [[device]]
            name = "k1"
            type = "davis"
            serial_device = "/dev/ttyUSB0"
            hostname = "1.2.3.4"
            port = 22222
        "#;
        assert!(matches!(parse(toml), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn parse_rejects_neither_transport() {
        let toml = r#"
            [[device]]
            name = "k1"
            type = "davis"
        "#;
        assert!(matches!(parse(toml), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn parse_rejects_duplicate_names() {
        let toml = r#"
            [[device]]
            name = "k1"
            type = "davis"
            hostname = "1.2.3.4"
            port = 22222

            [[device]]
            name = "k1"
            type = "campbell"
            hostname = "1.2.3.5"
            port = 22222
        "#;
        assert!(matches!(parse(toml), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn parse_rejects_out_of_range_wind_correction() {
        let toml = r#"
            [[device]]
            name = "k1"
            type = "davis"
            hostname = "1.2.3.4"
            port = 22222
            wind_dir_correction = 400
        "#;
        assert!(matches!(parse(toml), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn parse_accepts_minimal_valid_device() {
        let toml = r#"
            [[device]]
            name = "k1"
            type = "davis"
            hostname = "1.2.3.4"
            port = 22222
        "#;
        let (devices, sinks) = parse(toml).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "k1");
        assert!(sinks.timeseries_enabled);
    }

    #[test]
    fn parse_defaults_sinks_when_section_absent() {
        let (_devices, sinks) = parse("").unwrap();
        assert!(sinks.timeseries_enabled);
        assert!(!sinks.aprs_enabled);
    }
}

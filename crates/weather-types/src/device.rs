//! Configured-device and sink-descriptor types.
//!
//! A `Device` is a configured ingester instance; ownership and lifecycle
//! live in `weather-supervisor`, not here — this crate only carries the
//! value types both sides of that boundary share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport parameters for a device: exactly one of serial or TCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transport {
    Serial { device: String, baud: u32 },
    Tcp { hostname: String, port: u16 },
}

/// Geographic coordinates used for solar-potential computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

/// Per-service upload credentials and enable flag, keyed by the controller
/// that owns them (`weather-uploaders`). Kept generic here so new services
/// don't require a `Device` schema change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadServiceConfig {
    pub enabled: bool,
    pub station_id: String,
    pub api_key: String,
    /// Overrides the service's default tick interval, in seconds.
    pub interval_seconds: Option<u64>,
}

/// A configured ingester instance.
///
/// Invariant: `name` is unique among configured devices;
/// `wind_dir_correction` is in `-359..=359` and is always applied modulo 360.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub device_type: String,
    pub transport: Transport,
    pub wind_dir_correction: i32,
    pub base_snow_distance: Option<f64>,
    pub location: Option<GeoLocation>,
    pub snow_enabled: bool,
    pub uploads: std::collections::HashMap<String, UploadServiceConfig>,
    /// Device-type-specific settings that don't warrant a dedicated field on
    /// the shared schema (Davis's `rain_bucket_size`/`crc_failure_threshold`,
    /// the Ambient-HTTP ingester's listen path, a poller's interval). Each
    /// ingester constructor parses the keys it recognizes and applies its
    /// own default when a key is absent.
    #[serde(default)]
    pub options: std::collections::HashMap<String, String>,
}

impl Device {
    /// Validate the invariants a device must satisfy before an ingester can
    /// be constructed from it.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.name.trim().is_empty() {
            return Err(DeviceError::EmptyName);
        }
        if !(-359..=359).contains(&self.wind_dir_correction) {
            return Err(DeviceError::WindDirCorrectionOutOfRange(
                self.wind_dir_correction,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("device name must not be empty")]
    EmptyName,
    #[error("wind_dir_correction {0} is out of range [-359, 359]")]
    WindDirCorrectionOutOfRange(i32),
}

/// Which sinks are enabled for a configuration revision, and their configs.
///
/// Created once per config revision by the sink manager; owns sink tasks
/// until the next revision supersedes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkDescriptor {
    pub timeseries_enabled: bool,
    pub grpc_broadcast_enabled: bool,
    pub grpc_broadcast_bind: Option<String>,
    pub grpc_client_enabled: bool,
    pub grpc_client_upstream_url: Option<String>,
    pub aprs_enabled: bool,
}

/// A persistent registration of an upstream station reached through the
/// gRPC-receiver ingester.
///
/// Invariant: `station_id`, once issued, is stable across reconnects
/// until an operator deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStation {
    pub station_id: String,
    pub last_seen: DateTime<Utc>,
    pub timeseries_enabled: bool,
    pub grpc_broadcast_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, correction: i32) -> Device {
        Device {
            name: name.to_owned(),
            device_type: "davis".to_owned(),
            transport: Transport::Tcp { hostname: "h".to_owned(), port: 22222 },
            wind_dir_correction: correction,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads: Default::default(),
            options: Default::default(),
        }
    }

    #[test]
    fn validate_rejects_empty_name() {
        assert_eq!(device("", 0).validate(), Err(DeviceError::EmptyName));
    }

    #[test]
    fn validate_rejects_out_of_range_correction() {
        assert_eq!(
            device("k1", 360).validate(),
            Err(DeviceError::WindDirCorrectionOutOfRange(360))
        );
        assert_eq!(
            device("k1", -360).validate(),
            Err(DeviceError::WindDirCorrectionOutOfRange(-360))
        );
    }

    #[test]
    fn validate_accepts_boundary_corrections() {
        assert!(device("k1", 359).validate().is_ok());
        assert!(device("k1", -359).validate().is_ok());
    }
}

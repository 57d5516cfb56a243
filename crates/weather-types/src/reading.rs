//! The canonical observation record.
//!
//! `Reading` is produced by exactly one ingester at one instant and is
//! immutable once constructed. It is extracted from the original
//! `models/chip.rs`-style "one value type per wire frame" idiom, generalized
//! from a single tag ID to the much wider weather-sensor field set.
//!
//! # Missing sensors
//!
//! A sensor that a device does not have (or did not report this cycle) is
//! represented by the zero value of its field, never by a sentinel. Ingesters
//! are responsible for converting their own wire sentinels (e.g. Davis's
//! 0xFF/0xFFFF/0x8000) before a `Reading` is constructed; sinks never see a
//! sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, normalized weather observation from one station.
///
/// Construction is always via [`Reading::new`] followed by field
/// assignment, or via [`Default`] plus assignment — there is no builder,
/// matching the flat-struct-literal style the rest of the pack's wire types
/// use (see `ReadEvent`/`ForwarderHello` in the sibling protocol crates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub station_name: String,
    pub station_type: String,

    // ---- Temperature (°F) ----------------------------------------------
    pub outside_temperature: f64,
    pub inside_temperature: f64,
    pub extra_temperature: [f64; 7],
    pub soil_temperature: [f64; 4],
    pub leaf_temperature: [f64; 4],

    // ---- Humidity (%) ----------------------------------------------------
    pub outside_humidity: f64,
    pub inside_humidity: f64,
    pub extra_humidity: [f64; 7],

    // ---- Wind --------------------------------------------------------------
    pub wind_speed: f64,
    pub wind_speed_10min_avg: f64,
    pub wind_dir: f64,
    pub wind_chill: f64,
    pub heat_index: f64,
    pub wind_gust: f64,

    // ---- Barometer -----------------------------------------------------
    pub barometer: f64,

    // ---- Rain ------------------------------------------------------------
    pub rain_rate: f64,
    pub rain_incremental: f64,
    pub rain_storm: f64,
    pub rain_day: f64,
    pub rain_month: f64,
    pub rain_year: f64,

    // ---- Solar -----------------------------------------------------------
    pub solar_watts: f64,
    pub potential_solar_watts: f64,
    pub solar_joules: f64,
    pub uv_index: f64,
    pub radiation: f64,

    // ---- Evapotranspiration ------------------------------------------
    pub evapotranspiration_day: f64,
    pub evapotranspiration_month: f64,
    pub evapotranspiration_year: f64,

    // ---- Soil / leaf -------------------------------------------------
    pub soil_moisture: [f64; 4],
    pub leaf_wetness: [f64; 4],

    // ---- Snow --------------------------------------------------------
    pub snow_distance: f64,
    pub snow_depth: f64,

    // ---- Air quality ---------------------------------------------------
    pub pm25: f64,
    pub pm10: f64,
    pub co2: f64,
    pub lightning_count: f64,
    pub lightning_distance: f64,

    /// Reserved floating-point pool for fields that don't yet have a name
    /// (device-specific extensions). Sinks suppress zero entries.
    pub reserved_float: [f64; 10],
    /// Reserved string pool, same rationale as `reserved_float`.
    pub reserved_string: [String; 10],

    // ---- Alarms and battery (small integers) ---------------------------
    /// Bit-per-alarm fields as reported by the device driver; suppressed by
    /// sinks when all zero. Order is device-family specific and is not
    /// otherwise interpreted by this crate.
    pub alarms: [i32; 32],
    pub battery_status: [i32; 8],

    // ---- Nested instants -------------------------------------------------
    pub storm_start: Option<DateTime<Utc>>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
}

impl Reading {
    /// Construct a zeroed reading for `station_name`/`station_type` stamped
    /// at `timestamp`. Callers fill in whichever fields their device reports.
    pub fn new(station_name: impl Into<String>, station_type: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Reading {
            timestamp,
            station_name: station_name.into(),
            station_type: station_type.into(),
            outside_temperature: 0.0,
            inside_temperature: 0.0,
            extra_temperature: [0.0; 7],
            soil_temperature: [0.0; 4],
            leaf_temperature: [0.0; 4],
            outside_humidity: 0.0,
            inside_humidity: 0.0,
            extra_humidity: [0.0; 7],
            wind_speed: 0.0,
            wind_speed_10min_avg: 0.0,
            wind_dir: 0.0,
            wind_chill: 0.0,
            heat_index: 0.0,
            wind_gust: 0.0,
            barometer: 0.0,
            rain_rate: 0.0,
            rain_incremental: 0.0,
            rain_storm: 0.0,
            rain_day: 0.0,
            rain_month: 0.0,
            rain_year: 0.0,
            solar_watts: 0.0,
            potential_solar_watts: 0.0,
            solar_joules: 0.0,
            uv_index: 0.0,
            radiation: 0.0,
            evapotranspiration_day: 0.0,
            evapotranspiration_month: 0.0,
            evapotranspiration_year: 0.0,
            soil_moisture: [0.0; 4],
            leaf_wetness: [0.0; 4],
            snow_distance: 0.0,
            snow_depth: 0.0,
            pm25: 0.0,
            pm10: 0.0,
            co2: 0.0,
            lightning_count: 0.0,
            lightning_distance: 0.0,
            reserved_float: [0.0; 10],
            reserved_string: Default::default(),
            alarms: [0; 32],
            battery_status: [0; 8],
            storm_start: None,
            sunrise: None,
            sunset: None,
        }
    }

    /// Validate the invariants every emitted reading must satisfy:
    /// non-empty station name, and `wind_dir` in `[0, 360)`.
    pub fn validate(&self) -> Result<(), ReadingError> {
        if self.station_name.trim().is_empty() {
            return Err(ReadingError::EmptyStationName);
        }
        if !(0.0..360.0).contains(&self.wind_dir) {
            return Err(ReadingError::WindDirOutOfRange(self.wind_dir));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq)]
pub enum ReadingError {
    #[error("station_name must not be empty")]
    EmptyStationName,
    #[error("wind_dir {0} is out of range [0, 360)")]
    WindDirOutOfRange(f64),
}

/// A `Reading` widened with the aggregation-window start and the rain that
/// fell during that window. Produced only by the time-series store; never
/// by an ingester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketReading {
    pub reading: Reading,
    pub bucket: DateTime<Utc>,
    pub period_rain: f64,
}

/// Apply a wind direction correction (degrees, may be negative) and wrap the
/// result into `[0, 360)`.
///
/// `(dir + correction) mod 360`, mapping negative results into the positive
/// range. Rust's `%` keeps the sign of the dividend, so the wrap has to be
/// done by hand rather than with a bare `%`.
pub fn correct_wind_dir(dir: f64, correction_degrees: i32) -> f64 {
    let corrected = dir + f64::from(correction_degrees);
    let wrapped = corrected % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_station_name() {
        let r = Reading::new("", "davis", Utc::now());
        assert_eq!(r.validate(), Err(ReadingError::EmptyStationName));
    }

    #[test]
    fn validate_rejects_wind_dir_out_of_range() {
        let mut r = Reading::new("kxx", "davis", Utc::now());
        r.wind_dir = 360.0;
        assert_eq!(r.validate(), Err(ReadingError::WindDirOutOfRange(360.0)));
    }

    #[test]
    fn validate_accepts_zero_wind_dir() {
        let r = Reading::new("kxx", "davis", Utc::now());
        assert!(r.validate().is_ok());
    }

    #[test]
    fn correct_wind_dir_wraps_positive_overflow() {
        assert_eq!(correct_wind_dir(350.0, 20), 10.0);
    }

    #[test]
    fn correct_wind_dir_wraps_negative_correction() {
        assert_eq!(correct_wind_dir(5.0, -10), 355.0);
    }

    #[test]
    fn correct_wind_dir_applied_twice_with_c_and_negated_c_is_identity() {
        let original = 123.0;
        let c = 47;
        let once = correct_wind_dir(original, c);
        let twice = correct_wind_dir(once, -c);
        assert!((twice - original).abs() < 1e-9);
    }

    #[test]
    fn correct_wind_dir_zero_speed_has_defined_direction() {
        assert_eq!(correct_wind_dir(0.0, 0), 0.0);
    }

    #[test]
    fn reading_new_is_all_zero_sentinel_free() {
        let r = Reading::new("kxx", "davis", Utc::now());
        assert_eq!(r.outside_temperature, 0.0);
        assert!(r.extra_temperature.iter().all(|&v| v == 0.0));
        assert!(r.alarms.iter().all(|&v| v == 0));
    }
}

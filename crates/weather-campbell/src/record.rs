//! The Campbell Scientific datalogger's newline-delimited JSON record.
//!
//! Decoded into a fixed named-field record matching the common CR-series
//! datalogger table export fields (e.g. `{"wind_d": 5}` for wind direction).

use serde::Deserialize;
use weather_types::{correct_wind_dir, Reading};

#[derive(Debug, Clone, Deserialize)]
pub struct CampbellRecord {
    #[serde(default)]
    pub temp_f: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub wind_s: f64,
    #[serde(default)]
    pub wind_d: f64,
    #[serde(default)]
    pub wind_gust: f64,
    #[serde(default)]
    pub bar_in: f64,
    #[serde(default)]
    pub rain_in: f64,
    #[serde(default)]
    pub solar_wm2: f64,
}

impl CampbellRecord {
    pub fn into_reading(self, station_name: &str, wind_dir_correction: i32, now: chrono::DateTime<chrono::Utc>) -> Reading {
        let mut r = Reading::new(station_name, "campbell", now);
        r.outside_temperature = self.temp_f;
        r.outside_humidity = self.humidity;
        r.wind_speed = self.wind_s;
        r.wind_gust = self.wind_gust;
        r.wind_dir = correct_wind_dir(self.wind_d, wind_dir_correction);
        r.barometer = self.bar_in;
        r.rain_incremental = self.rain_in;
        r.solar_watts = self.solar_wm2;
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wind_correction_applies_to_decoded_record() {
        let record: CampbellRecord = serde_json::from_str(r#"{"wind_d":5}"#).unwrap();
        let reading = record.into_reading("k1", -10, chrono::Utc::now());
        assert_eq!(reading.wind_dir, 355.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let record: CampbellRecord = serde_json::from_str("{}").unwrap();
        let reading = record.into_reading("k1", 0, chrono::Utc::now());
        assert_eq!(reading.outside_temperature, 0.0);
        assert_eq!(reading.solar_watts, 0.0);
    }
}

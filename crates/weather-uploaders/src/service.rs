//! The `UploadService` trait and its implementations.

use std::time::Duration;

use weather_types::{BucketReading, Device};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("device is not configured for this service")]
    NotConfigured,
}

/// One third-party weather-upload target.
///
/// A sink descriptor carries a type tag and a payload variant; here the
/// variant is one trait impl per service, matching the same
/// open-set-of-implementations shape as [`weather_types::Ingester`]'s
/// registry, just without a dynamic registry (the set of upload services
/// this daemon knows about is fixed at compile time).
pub trait UploadService: Send + Sync {
    /// Human-readable service name (also the config key, e.g. `"pws"`).
    fn name(&self) -> &str;

    /// Default tick interval if the device does not override it (e.g. 60 s
    /// for PWS Weather).
    fn default_interval(&self) -> Duration;

    /// Build the request URL for `device`'s configured credentials.
    fn endpoint_for(&self, device: &Device) -> Result<String, UploadError>;

    /// Encode `bucket` as this service's `application/x-www-form-urlencoded`
    /// body.
    fn encode_body(&self, device: &Device, bucket: &BucketReading) -> Result<String, UploadError>;
}

fn form_urlencode_pairs(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Minimal `application/x-www-form-urlencoded` value encoder — the inverse
/// of `weather-http-ingest::fields::percent_decode`, kept local since each
/// crate only needs one direction of the transform.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn credentials<'a>(device: &'a Device, service_key: &str) -> Result<&'a weather_types::UploadServiceConfig, UploadError> {
    device.uploads.get(service_key).filter(|c| c.enabled).ok_or(UploadError::NotConfigured)
}

/// PWS Weather.
pub struct PwsWeather;

impl UploadService for PwsWeather {
    fn name(&self) -> &str {
        "pws"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn endpoint_for(&self, device: &Device) -> Result<String, UploadError> {
        credentials(device, self.name())?;
        Ok("https://pwsupdate.pwsweather.com/api/v1/submitwx".to_owned())
    }

    fn encode_body(&self, device: &Device, bucket: &BucketReading) -> Result<String, UploadError> {
        let creds = credentials(device, self.name())?;
        let r = &bucket.reading;
        Ok(form_urlencode_pairs(&[
            ("ID", creds.station_id.clone()),
            ("PASSWORD", creds.api_key.clone()),
            ("dateutc", r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("winddir", r.wind_dir.to_string()),
            ("windspeedmph", r.wind_speed.to_string()),
            ("windgustmph", r.wind_gust.to_string()),
            ("humidity", r.outside_humidity.to_string()),
            ("tempf", r.outside_temperature.to_string()),
            ("dailyrainin", r.rain_day.to_string()),
            ("baromin", r.barometer.to_string()),
            ("solarradiation", r.solar_watts.to_string()),
            ("softwaretype", "remoteweather".to_owned()),
        ]))
    }
}

/// Weather Underground: analogous to PWS Weather, with vendor-specific
/// endpoints and key names.
pub struct WeatherUnderground;

impl UploadService for WeatherUnderground {
    fn name(&self) -> &str {
        "wunderground"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn endpoint_for(&self, device: &Device) -> Result<String, UploadError> {
        credentials(device, self.name())?;
        Ok("https://weatherstation.wunderground.com/weatherstation/updateweatherstation.php".to_owned())
    }

    fn encode_body(&self, device: &Device, bucket: &BucketReading) -> Result<String, UploadError> {
        let creds = credentials(device, self.name())?;
        let r = &bucket.reading;
        Ok(form_urlencode_pairs(&[
            ("ID", creds.station_id.clone()),
            ("PASSWORD", creds.api_key.clone()),
            ("dateutc", r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("winddir", r.wind_dir.to_string()),
            ("windspeedmph", r.wind_speed.to_string()),
            ("windgustmph", r.wind_gust.to_string()),
            ("humidity", r.outside_humidity.to_string()),
            ("tempf", r.outside_temperature.to_string()),
            ("rainin", r.rain_rate.to_string()),
            ("dailyrainin", r.rain_day.to_string()),
            ("baromin", r.barometer.to_string()),
            ("solarradiation", r.solar_watts.to_string()),
            ("UV", r.uv_index.to_string()),
            ("action", "updateraw".to_owned()),
        ]))
    }
}

/// Aeris Weather's personal weather station ingest endpoint.
pub struct Aeris;

impl UploadService for Aeris {
    fn name(&self) -> &str {
        "aeris"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn endpoint_for(&self, device: &Device) -> Result<String, UploadError> {
        credentials(device, self.name())?;
        Ok("https://data.aerisapi.com/pws/submit".to_owned())
    }

    fn encode_body(&self, device: &Device, bucket: &BucketReading) -> Result<String, UploadError> {
        let creds = credentials(device, self.name())?;
        let r = &bucket.reading;
        Ok(form_urlencode_pairs(&[
            ("id", creds.station_id.clone()),
            ("key", creds.api_key.clone()),
            ("dateutc", r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("tempf", r.outside_temperature.to_string()),
            ("humidity", r.outside_humidity.to_string()),
            ("baromin", r.barometer.to_string()),
            ("winddir", r.wind_dir.to_string()),
            ("windspeedmph", r.wind_speed.to_string()),
            ("dailyrainin", r.rain_day.to_string()),
        ]))
    }
}

/// A supplemental, operator-defined form-encoded target, for upload
/// services not otherwise named by this daemon. Endpoint and key set both
/// come from `device.options`.
pub struct GenericFormUpload;

impl UploadService for GenericFormUpload {
    fn name(&self) -> &str {
        "generic"
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn endpoint_for(&self, device: &Device) -> Result<String, UploadError> {
        credentials(device, self.name())?;
        device.options.get("generic_upload_url").cloned().ok_or(UploadError::NotConfigured)
    }

    fn encode_body(&self, device: &Device, bucket: &BucketReading) -> Result<String, UploadError> {
        let creds = credentials(device, self.name())?;
        let r = &bucket.reading;
        Ok(form_urlencode_pairs(&[
            ("station_id", creds.station_id.clone()),
            ("api_key", creds.api_key.clone()),
            ("dateutc", r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("tempf", r.outside_temperature.to_string()),
            ("humidity", r.outside_humidity.to_string()),
            ("baromin", r.barometer.to_string()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weather_types::{Reading, Transport, UploadServiceConfig};

    fn device_with(service: &str, enabled: bool) -> Device {
        let mut uploads = std::collections::HashMap::new();
        uploads.insert(
            service.to_owned(),
            UploadServiceConfig { enabled, station_id: "STN1".to_owned(), api_key: "key".to_owned(), interval_seconds: None },
        );
        Device {
            name: "k1".to_owned(),
            device_type: "davis".to_owned(),
            transport: Transport::Tcp { hostname: "h".to_owned(), port: 1 },
            wind_dir_correction: 0,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads,
            options: Default::default(),
        }
    }

    fn bucket() -> BucketReading {
        BucketReading { reading: Reading::new("k1", "davis", Utc::now()), bucket: Utc::now(), period_rain: 0.0 }
    }

    #[test]
    fn endpoint_for_fails_when_the_service_is_not_enabled() {
        let device = device_with("pws", false);
        assert!(PwsWeather.endpoint_for(&device).is_err());
    }

    #[test]
    fn pws_weather_encodes_station_and_password() {
        let device = device_with("pws", true);
        let body = PwsWeather.encode_body(&device, &bucket()).unwrap();
        assert!(body.contains("ID=STN1"));
        assert!(body.contains("PASSWORD=key"));
    }

    #[test]
    fn urlencode_escapes_spaces_as_plus() {
        assert_eq!(urlencode("a b"), "a+b");
    }

    #[test]
    fn generic_upload_reads_its_endpoint_from_device_options() {
        let mut device = device_with("generic", true);
        device.options.insert("generic_upload_url".to_owned(), "https://example.test/ingest".to_owned());
        assert_eq!(GenericFormUpload.endpoint_for(&device).unwrap(), "https://example.test/ingest");
    }
}

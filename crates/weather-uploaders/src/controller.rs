//! Per-device upload controller: ticks on a configurable interval, pulls
//! the most recent `weather_1m` bucket for its device, and POSTs it to the
//! configured service with no retry on failure.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weather_timeseries::{BucketResolution, TimeSeriesStore};
use weather_types::{BucketReading, Device};

use crate::service::{UploadError, UploadService};

const UPLOAD_HTTP_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("upload controller misconfigured: {0}")]
    Config(#[from] UploadError),
    #[error("HTTP client build failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Runs one [`UploadService`] against one [`Device`].
///
/// Construction validates `pull_from_device` up front — `service.endpoint_for`
/// fails immediately if the device has no enabled credentials for this
/// service, rather than failing silently on every tick.
pub struct UploadController {
    device: Device,
    service: Arc<dyn UploadService>,
    store: Arc<dyn TimeSeriesStore>,
    client: reqwest::Client,
    interval: Duration,
}

impl UploadController {
    pub fn new(device: Device, service: Arc<dyn UploadService>, store: Arc<dyn TimeSeriesStore>) -> Result<Self, ControllerError> {
        // Construction-time validation: fail now, not on the first tick.
        service.endpoint_for(&device)?;

        let interval = device
            .uploads
            .get(service.name())
            .and_then(|c| c.interval_seconds)
            .map(Duration::from_secs)
            .unwrap_or_else(|| service.default_interval());

        let client = reqwest::Client::builder().timeout(UPLOAD_HTTP_TIMEOUT).build()?;

        Ok(Self { device, service, store, client, interval })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => self.tick_once().await,
            }
        }
    }

    async fn tick_once(&self) {
        let bucket = match self.store.latest_bucket(&self.device.name, BucketResolution::OneMinute).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!(station = %self.device.name, service = self.service.name(), "no bucket yet, skipping upload");
                return;
            }
            Err(e) => {
                warn!(station = %self.device.name, service = self.service.name(), error = %e, "bucket read failed");
                return;
            }
        };

        if !bucket_is_usable(&bucket) {
            debug!(station = %self.device.name, service = self.service.name(), "bucket is empty, skipping upload");
            return;
        }

        if let Err(e) = self.post(&bucket).await {
            warn!(station = %self.device.name, service = self.service.name(), error = %e, "upload failed");
        }
    }

    async fn post(&self, bucket: &BucketReading) -> Result<(), UploadPostError> {
        let url = self.service.endpoint_for(&self.device)?;
        let body = self.service.encode_body(&self.device, bucket)?;

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(UploadPostError::BadStatus(resp.status().as_u16()))
        }
    }
}

#[derive(Debug, Error)]
enum UploadPostError {
    #[error(transparent)]
    Service(#[from] UploadError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("upload service returned status {0}")]
    BadStatus(u16),
}

/// A bucket with a zero timestamp or every sensor field zero is treated as
/// "no reading landed yet" rather than uploaded as real data. A single
/// sensor legitimately reading `0.0` (freezing outside temperature, calm
/// wind, no rain) must not discard an otherwise-populated bucket, so every
/// scalar and array field is checked rather than gating on one field.
fn bucket_is_usable(bucket: &BucketReading) -> bool {
    if bucket.bucket.timestamp_millis() == 0 {
        return false;
    }

    let r = &bucket.reading;
    let scalars = [
        r.outside_temperature,
        r.inside_temperature,
        r.outside_humidity,
        r.inside_humidity,
        r.wind_speed,
        r.wind_speed_10min_avg,
        r.wind_dir,
        r.wind_chill,
        r.heat_index,
        r.wind_gust,
        r.barometer,
        r.rain_rate,
        r.rain_incremental,
        r.rain_storm,
        r.rain_day,
        r.rain_month,
        r.rain_year,
        r.solar_watts,
        r.potential_solar_watts,
        r.solar_joules,
        r.uv_index,
        r.radiation,
        r.evapotranspiration_day,
        r.evapotranspiration_month,
        r.evapotranspiration_year,
        r.snow_distance,
        r.snow_depth,
        r.pm25,
        r.pm10,
        r.co2,
        r.lightning_count,
        r.lightning_distance,
        bucket.period_rain,
    ];
    let arrays_nonzero = r.extra_temperature.iter().any(|&v| v != 0.0)
        || r.soil_temperature.iter().any(|&v| v != 0.0)
        || r.leaf_temperature.iter().any(|&v| v != 0.0)
        || r.extra_humidity.iter().any(|&v| v != 0.0)
        || r.soil_moisture.iter().any(|&v| v != 0.0)
        || r.leaf_wetness.iter().any(|&v| v != 0.0)
        || r.reserved_float.iter().any(|&v| v != 0.0);

    scalars.iter().any(|&v| v != 0.0) || arrays_nonzero
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::PwsWeather;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use weather_timeseries::TimeSeriesError;
    use weather_types::{Reading, Transport, UploadServiceConfig};

    struct StubStore {
        bucket: Option<BucketReading>,
    }

    #[async_trait]
    impl TimeSeriesStore for StubStore {
        async fn write(&self, _reading: &Reading) -> Result<(), TimeSeriesError> {
            Ok(())
        }

        async fn latest_bucket(&self, _station: &str, _resolution: BucketResolution) -> Result<Option<BucketReading>, TimeSeriesError> {
            Ok(self.bucket.clone())
        }

        async fn span(&self, _station: &str, _duration: Duration) -> Result<Vec<BucketReading>, TimeSeriesError> {
            Ok(vec![])
        }

        async fn ping(&self) -> Result<(), TimeSeriesError> {
            Ok(())
        }
    }

    fn device_with_pws() -> Device {
        let mut uploads = HashMap::new();
        uploads.insert(
            "pws".to_owned(),
            UploadServiceConfig { enabled: true, station_id: "STN1".to_owned(), api_key: "key".to_owned(), interval_seconds: Some(30) },
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

    #[tokio::test]
    async fn construction_fails_when_the_device_has_no_credentials_for_the_service() {
        let device = Device { uploads: Default::default(), ..device_with_pws() };
        let store = Arc::new(StubStore { bucket: None });
        let result = UploadController::new(device, Arc::new(PwsWeather), store);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn construction_uses_the_devices_overridden_interval() {
        let device = device_with_pws();
        let store = Arc::new(StubStore { bucket: None });
        let controller = UploadController::new(device, Arc::new(PwsWeather), store).unwrap();
        assert_eq!(controller.interval, Duration::from_secs(30));
    }

    #[test]
    fn bucket_is_usable_rejects_a_zero_timestamp_bucket() {
        let reading = Reading::new("k1", "davis", Utc::now());
        let bucket = BucketReading { reading, bucket: chrono::DateTime::<Utc>::from_timestamp(0, 0).unwrap(), period_rain: 0.0 };
        assert!(!bucket_is_usable(&bucket));
    }

    #[test]
    fn bucket_is_usable_accepts_a_populated_bucket() {
        let mut reading = Reading::new("k1", "davis", Utc::now());
        reading.outside_temperature = 55.0;
        let bucket = BucketReading { reading, bucket: Utc::now(), period_rain: 0.0 };
        assert!(bucket_is_usable(&bucket));
    }

    #[test]
    fn bucket_is_usable_rejects_an_all_zero_bucket() {
        let reading = Reading::new("k1", "davis", Utc::now());
        let bucket = BucketReading { reading, bucket: Utc::now(), period_rain: 0.0 };
        assert!(!bucket_is_usable(&bucket));
    }

    #[test]
    fn bucket_is_usable_accepts_a_freezing_outside_temperature_with_another_nonzero_field() {
        // outside_temperature == 0.0 is a perfectly normal freezing-point
        // reading, not an absence marker — a bucket must not be discarded
        // just because this one field happens to be zero.
        let mut reading = Reading::new("k1", "davis", Utc::now());
        reading.outside_temperature = 0.0;
        reading.wind_speed = 12.0;
        let bucket = BucketReading { reading, bucket: Utc::now(), period_rain: 0.0 };
        assert!(bucket_is_usable(&bucket));
    }
}

//! Builds and spawns an [`UploadController`] for every device/service pair
//! with enabled credentials.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use weather_config::ConfigProvider;
use weather_timeseries::TimeSeriesStore;
use weather_uploaders::{Aeris, GenericFormUpload, PwsWeather, UploadController, UploadService, WeatherUnderground};

fn known_services() -> Vec<Arc<dyn UploadService>> {
    vec![Arc::new(PwsWeather), Arc::new(WeatherUnderground), Arc::new(Aeris), Arc::new(GenericFormUpload)]
}

/// For every configured device, for every upload service it has enabled
/// credentials for, construct and spawn a controller. Construction failures
/// (no enabled credentials) are the expected steady state for most
/// device/service pairs and are silently skipped, not logged as errors.
/// Returns every spawned controller's `JoinHandle` so the caller can wait
/// for them to exit at shutdown.
pub async fn spawn_all(config: Arc<dyn ConfigProvider>, store: Arc<dyn TimeSeriesStore>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
    let devices = config.devices().await;
    let services = known_services();
    let mut handles = Vec::new();

    for device in devices {
        for service in &services {
            match UploadController::new(device.clone(), service.clone(), store.clone()) {
                Ok(controller) => {
                    let child = shutdown.child_token();
                    handles.push(tokio::spawn(async move { controller.run(child).await }));
                }
                Err(_) => continue,
            }
        }
    }

    handles
}

//! Third-party weather-upload services and their per-device controllers.

mod controller;
mod service;

pub use controller::{ControllerError, UploadController};
pub use service::{Aeris, GenericFormUpload, PwsWeather, UploadError, UploadService, WeatherUnderground};

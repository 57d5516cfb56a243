//! Shared value types and capability traits for the RemoteWeather workspace.

pub mod device;
pub mod reading;
pub mod traits;

pub use device::{Device, DeviceError, GeoLocation, RemoteStation, SinkDescriptor, Transport, UploadServiceConfig};
pub use reading::{correct_wind_dir, BucketReading, Reading, ReadingError};
pub use traits::{
    HealthStatus, IngestError, Ingester, ReadingReceiver, ReadingSender, ShutdownHandle, Sink, SinkHealth, SinkKind,
};

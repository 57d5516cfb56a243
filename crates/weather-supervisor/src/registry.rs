//! Maps a configured device's `type` string to an ingester constructor.
//!
//! Dynamic dispatch across ingester types is modeled as a registry mapping
//! config `type` strings to constructors. Kept as a plain owned map rather
//! than a trait object registry pattern so `main` can populate it without
//! this crate depending on every concrete ingester crate (`weather-davis`,
//! `weather-campbell`, ...) — the dependency runs the other way, avoiding a
//! cycle and keeping `weather-supervisor` generic over ingester kinds, the
//! same separation the teacher keeps between `rt-protocol` (shapes) and the
//! services that implement protocol roles.

use std::collections::HashMap;
use std::sync::Arc;

use weather_types::{Device, IngestError, Ingester};

/// Builds a boxed ingester from a validated device config.
pub type IngesterConstructor = Arc<dyn Fn(&Device) -> Result<Box<dyn Ingester>, IngestError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct IngesterRegistry {
    constructors: HashMap<String, IngesterConstructor>,
}

impl IngesterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a `device_type` string (e.g. `"davis"`).
    /// Registering the same type twice replaces the earlier constructor.
    pub fn register(&mut self, device_type: impl Into<String>, ctor: IngesterConstructor) {
        self.constructors.insert(device_type.into(), ctor);
    }

    /// Build an ingester for `device`, failing if `device.device_type` has no
    /// registered constructor or the constructor itself rejects the config.
    pub fn build(&self, device: &Device) -> Result<Box<dyn Ingester>, IngestError> {
        let ctor = self
            .constructors
            .get(device.device_type.as_str())
            .ok_or_else(|| IngestError::Config(format!("unknown device type '{}'", device.device_type)))?;
        ctor(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weather_types::{ReadingSender, ShutdownHandle};

    struct StubIngester(String);

    #[async_trait]
    impl Ingester for StubIngester {
        fn name(&self) -> &str {
            &self.0
        }
        async fn start(&self, _ctx: ShutdownHandle, _out: ReadingSender) -> Result<(), IngestError> {
            Ok(())
        }
        async fn stop(&self) {}
    }

    #[test]
    fn build_fails_for_unknown_type() {
        let registry = IngesterRegistry::new();
        let device = Device {
            name: "k1".into(),
            device_type: "mystery".into(),
            transport: weather_types::Transport::Tcp { hostname: "h".into(), port: 1 },
            wind_dir_correction: 0,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads: Default::default(),
            options: Default::default(),
        };
        assert!(registry.build(&device).is_err());
    }

    #[test]
    fn build_dispatches_to_registered_constructor() {
        let mut registry = IngesterRegistry::new();
        registry.register("davis", Arc::new(|d: &Device| Ok(Box::new(StubIngester(d.name.clone())) as Box<dyn Ingester>)));
        let device = Device {
            name: "k1".into(),
            device_type: "davis".into(),
            transport: weather_types::Transport::Tcp { hostname: "h".into(), port: 1 },
            wind_dir_correction: 0,
            base_snow_distance: None,
            location: None,
            snow_enabled: false,
            uploads: Default::default(),
            options: Default::default(),
        };
        let ingester = registry.build(&device).unwrap();
        assert_eq!(ingester.name(), "k1");
    }
}

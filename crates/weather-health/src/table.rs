//! The process-local health table: a sink-kind-keyed map, read-copy-updated
//! under a sync `RwLock`.
//!
//! Grounded on `services/receiver/src/cache.rs`'s `StreamCounts` — an
//! `Arc<RwLock<HashMap<..>>>` wrapped in a small `Clone` handle so every
//! holder shares one table without threading a reference through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use weather_types::{SinkHealth, SinkKind};

#[derive(Clone, Default)]
pub struct HealthTable {
    inner: Arc<RwLock<HashMap<SinkKind, SinkHealth>>>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: SinkKind, health: SinkHealth) {
        self.inner.write().unwrap().insert(kind, health);
    }

    pub fn get(&self, kind: SinkKind) -> Option<SinkHealth> {
        self.inner.read().unwrap().get(&kind).cloned()
    }

    pub fn snapshot(&self) -> HashMap<SinkKind, SinkHealth> {
        self.inner.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use weather_types::HealthStatus;

    fn health(status: HealthStatus) -> SinkHealth {
        SinkHealth { status, message: "ok".to_owned(), last_check: Utc::now() }
    }

    #[test]
    fn record_then_get_round_trips() {
        let table = HealthTable::new();
        table.record(SinkKind::Aprs, health(HealthStatus::Healthy));
        assert_eq!(table.get(SinkKind::Aprs).unwrap().status, HealthStatus::Healthy);
    }

    #[test]
    fn get_is_none_for_an_unrecorded_kind() {
        let table = HealthTable::new();
        assert!(table.get(SinkKind::TimeSeries).is_none());
    }

    #[test]
    fn a_later_record_overwrites_the_same_kind() {
        let table = HealthTable::new();
        table.record(SinkKind::GrpcClient, health(HealthStatus::Healthy));
        table.record(SinkKind::GrpcClient, health(HealthStatus::Unhealthy));
        assert_eq!(table.get(SinkKind::GrpcClient).unwrap().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn snapshot_reflects_every_recorded_kind() {
        let table = HealthTable::new();
        table.record(SinkKind::Aprs, health(HealthStatus::Healthy));
        table.record(SinkKind::TimeSeries, health(HealthStatus::Healthy));
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn cloned_handles_share_the_same_table() {
        let table = HealthTable::new();
        let other = table.clone();
        table.record(SinkKind::Aprs, health(HealthStatus::Healthy));
        assert!(other.get(SinkKind::Aprs).is_some());
    }
}

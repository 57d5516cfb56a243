//! The per-sink health monitor.

mod monitor;
mod table;

pub use monitor::{HealthMonitor, APRS_PROBE_INTERVAL, PROBE_INTERVAL};
pub use table::HealthTable;

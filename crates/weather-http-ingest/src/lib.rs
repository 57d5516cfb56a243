//! The Ambient-HTTP push ingester and supplemental HTTP pollers.

mod fields;
mod formulas;
mod ingester;
mod pollers;
mod rain_tracker;

pub use formulas::{apparent_heat_index, apparent_wind_chill};
pub use ingester::AmbientHttpIngester;
pub use pollers::{AirGradientPoller, GenericHttpPoller, SnowGaugePoller};
pub use rain_tracker::RainTracker;

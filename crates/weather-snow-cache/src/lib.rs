//! The snow-accumulation cache refresher.

mod calculator;
mod refresher;

pub use calculator::{Calculator, CalculatorError};
pub use refresher::{SnowCacheRefresher, ACCUMULATION_INTERVAL, ROLLING_INTERVAL};

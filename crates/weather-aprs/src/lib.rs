//! The APRS-IS weather-report sink.

mod encode;
mod passcode;
mod sink;

pub use passcode::passcode;
pub use sink::{AprsError, AprsSink, AprsStation, EXCHANGE_TIMEOUT, REPORT_INTERVAL};

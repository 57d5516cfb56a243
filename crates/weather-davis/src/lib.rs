//! Davis VantagePro binary protocol ingester.

mod crc;
mod ingester;
pub mod packet;
pub mod transport;

pub use crc::crc16_ccitt;
pub use ingester::DavisIngester;

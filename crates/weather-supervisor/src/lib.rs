//! Station supervisor: lifecycle of every configured ingester.

mod registry;
mod supervisor;

pub use registry::{IngesterConstructor, IngesterRegistry};
pub use supervisor::{Supervisor, DEFAULT_STOP_GRACE_PERIOD};

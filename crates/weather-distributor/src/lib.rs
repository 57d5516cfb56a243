//! The fan-in/fan-out reading distributor.

mod distributor;

pub use distributor::{
    run, Distributor, SinkHandle, SubmitError, DEFAULT_INPUT_CAPACITY, DEFAULT_SINK_CAPACITY,
};

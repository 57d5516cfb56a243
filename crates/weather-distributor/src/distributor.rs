//! The reading distributor: the sole coupling point between ingest and sink
//! scheduling.
//!
//! Grounded on `services/forwarder/src/local_fanout.rs`'s `FanoutServer`: a
//! registry of per-consumer channels guarded by a lock, with delivery
//! iterating the registry and skipping consumers that can't keep up. Two
//! differences from that teacher shape: each sink gets its own bounded
//! `mpsc` channel rather than sharing one `broadcast` channel (so a slow
//! sink's backlog never evicts another sink's pending readings), and
//! delivery uses `try_send` — a full sink channel drops that one reading
//! instead of lagging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weather_types::Reading;

/// Default input channel capacity.
pub const DEFAULT_INPUT_CAPACITY: usize = 100;
/// Default per-sink channel capacity.
pub const DEFAULT_SINK_CAPACITY: usize = 10;

/// Opaque registration handle returned by [`Distributor::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

/// Error returned by [`Distributor::submit`] when the distributor has shut
/// down (its run loop exited and dropped the input receiver).
#[derive(Debug, thiserror::Error)]
#[error("distributor input channel closed")]
pub struct SubmitError;

struct Registry {
    next_id: AtomicU64,
    sinks: RwLock<HashMap<u64, mpsc::Sender<Reading>>>,
}

/// Fan-in/fan-out distributor. Cheaply `Clone`-able; every clone shares the
/// same input channel and sink registry.
#[derive(Clone)]
pub struct Distributor {
    input_tx: mpsc::Sender<Reading>,
    registry: Arc<Registry>,
}

impl Distributor {
    /// Build a distributor with the given input capacity. The returned
    /// receiver must be driven by [`run`] (usually spawned as its own task)
    /// for submitted readings to ever reach a sink.
    pub fn new(input_capacity: usize) -> (Self, mpsc::Receiver<Reading>) {
        let (input_tx, input_rx) = mpsc::channel(input_capacity);
        let distributor = Distributor {
            input_tx,
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                sinks: RwLock::new(HashMap::new()),
            }),
        };
        (distributor, input_rx)
    }

    /// Submit a reading. Blocks only until there is room in the input
    /// channel — never waits on any sink.
    pub async fn submit(&self, reading: Reading) -> Result<(), SubmitError> {
        self.input_tx.send(reading).await.map_err(|_| SubmitError)
    }

    /// A cloneable handle to the input channel, handed to ingesters as the
    /// `out` parameter of [`weather_types::Ingester::start`] so they can
    /// submit readings without depending on this crate's registry API.
    pub fn input_handle(&self) -> mpsc::Sender<Reading> {
        self.input_tx.clone()
    }

    /// Register a new sink with the given channel capacity (default
    /// [`DEFAULT_SINK_CAPACITY`] if `None`). Returns a handle for later
    /// deregistration and the receiving half for the sink task to consume.
    pub async fn register(&self, capacity: Option<usize>) -> (SinkHandle, mpsc::Receiver<Reading>) {
        let (tx, rx) = mpsc::channel(capacity.unwrap_or(DEFAULT_SINK_CAPACITY));
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.sinks.write().await.insert(id, tx);
        (SinkHandle(id), rx)
    }

    /// Deregister a sink. Idempotent — deregistering twice, or a handle that
    /// was never registered, is a no-op.
    pub async fn deregister(&self, handle: SinkHandle) {
        self.registry.sinks.write().await.remove(&handle.0);
    }

    /// Current number of registered sinks. Test/observability helper.
    pub async fn sink_count(&self) -> usize {
        self.registry.sinks.read().await.len()
    }
}

/// Drive delivery: pull readings off `input_rx` and fan each out to every
/// registered sink via non-blocking `try_send`. Exits when `shutdown` fires
/// or the input channel closes (all [`Distributor`] clones dropped).
pub async fn run(registry_source: Distributor, mut input_rx: mpsc::Receiver<Reading>, shutdown: CancellationToken) {
    loop {
        let reading = tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            reading = input_rx.recv() => match reading {
                Some(r) => r,
                None => return,
            },
        };

        let sinks = registry_source.registry.sinks.read().await;
        for (id, tx) in sinks.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(reading.clone()) {
                debug!(sink_id = id, station = %reading.station_name, "sink channel full, dropping reading for this sink");
            }
        }
    }
}

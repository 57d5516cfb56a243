//! The `ConfigProvider` capability trait.
//!
//! The configuration store itself (file-backed or embedded-SQL) is treated
//! as an opaque backend; this trait is the shape it serves. `weather-supervisor`
//! and `weather-grpc` depend on it, never on a concrete backend, the same
//! way the teacher's receiver depends on `JournalAccess` rather than on
//! `SqliteJournal` directly.

use async_trait::async_trait;
use tokio::sync::watch;
use weather_types::{Device, RemoteStation, SinkDescriptor};

use crate::model::ConfigError;

/// A live view over the daemon's configuration.
///
/// Every read method returns a snapshot; callers that need to react to
/// changes subscribe via [`ConfigProvider::subscribe`] and re-read after the
/// channel fires, rather than being handed a reference into provider state.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// The currently configured devices, in file order.
    async fn devices(&self) -> Vec<Device>;

    /// Which sinks are enabled, and their settings.
    async fn sinks(&self) -> SinkDescriptor;

    /// Fires (a new value, `()`) each time the provider's backing store is
    /// reloaded and produced a materially different snapshot. `watch`
    /// coalesces bursts into one notification, so a changed config file
    /// produces one supervisor diff pass, not one per changed device.
    fn subscribe(&self) -> watch::Receiver<()>;

    /// Re-read the backing store and, if its content changed, notify
    /// subscribers. Returns the error the store produced, if any — a failed
    /// reload leaves the previous snapshot in effect: a config file that fails
    /// to parse is logged and ignored, and the daemon keeps running on the
    /// last good configuration.
    async fn reload(&self) -> Result<(), ConfigError>;

    /// All remote-station registrations known to the gRPC-receiver ingester.
    async fn remote_stations(&self) -> Vec<RemoteStation>;

    /// Persist (insert or update, by `station_id`) a remote-station
    /// registration.
    async fn save_remote_station(&self, station: RemoteStation) -> Result<(), ConfigError>;

    /// Remove a remote-station registration. Idempotent.
    async fn delete_remote_station(&self, station_id: &str) -> Result<(), ConfigError>;

    /// The `station_id` this daemon was issued by an upstream gRPC-broadcast
    /// sink the last time it registered as a gRPC-client sink, if any.
    async fn grpc_client_station_id(&self) -> Option<String>;

    /// Persist the `station_id` issued by an upstream on registration, so a
    /// restart reuses it instead of registering a new station.
    async fn save_grpc_client_station_id(&self, station_id: &str) -> Result<(), ConfigError>;
}

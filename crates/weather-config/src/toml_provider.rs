//! File-backed `ConfigProvider`.
//!
//! Grounded on the teacher's `forwarder::config` load-on-start-plus-watch
//! pattern: a plain TOML file read fully into memory, re-read on demand, with
//! a `tokio::sync::watch` channel for change fan-out instead of the
//! teacher's `notify`-crate filesystem watch (this daemon's supervisor polls
//! `reload()` on a timer, so a filesystem watcher would be unused
//! machinery).
//!
//! Two files are involved:
//! - the *declarative* config (`config_path`), which an operator edits and
//!   which this provider never writes to;
//! - the *state* file (`state_path`), which this provider owns exclusively
//!   and rewrites whenever a remote station or the gRPC-client `station_id`
//!   changes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};
use weather_types::{Device, RemoteStation, SinkDescriptor};

use crate::model::{self, ConfigError};
use crate::provider::ConfigProvider;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    remote_stations: Vec<RemoteStation>,
    #[serde(default)]
    grpc_client_station_id: Option<String>,
}

struct Snapshot {
    devices: Vec<Device>,
    sinks: SinkDescriptor,
    raw: String,
}

/// Reads `config_path` once at construction, and again on every
/// [`ConfigProvider::reload`] call; persists runtime-owned state to
/// `state_path`.
pub struct TomlConfigProvider {
    config_path: PathBuf,
    state_path: PathBuf,
    snapshot: RwLock<Snapshot>,
    state: RwLock<StateFile>,
    changed_tx: watch::Sender<()>,
}

impl TomlConfigProvider {
    /// Load `config_path` and `state_path` (the latter created empty if
    /// absent) and build a provider over them.
    pub async fn open(config_path: PathBuf, state_path: PathBuf) -> Result<Arc<Self>, ConfigError> {
        let raw = read_to_string(&config_path).await?;
        let (devices, sinks) = model::parse(&raw)?;

        let state = match tokio::fs::read_to_string(&state_path).await {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: state_path.display().to_string(),
                    source,
                });
            }
        };

        let (changed_tx, _rx) = watch::channel(());
        Ok(Arc::new(Self {
            config_path,
            state_path,
            snapshot: RwLock::new(Snapshot { devices, sinks, raw }),
            state: RwLock::new(state),
            changed_tx,
        }))
    }

    async fn persist_state(&self, state: &StateFile) -> Result<(), ConfigError> {
        let serialized = toml::to_string_pretty(state)?;
        write_atomic(&self.state_path, &serialized).await
    }
}

#[async_trait]
impl ConfigProvider for TomlConfigProvider {
    async fn devices(&self) -> Vec<Device> {
        self.snapshot.read().await.devices.clone()
    }

    async fn sinks(&self) -> SinkDescriptor {
        self.snapshot.read().await.sinks.clone()
    }

    fn subscribe(&self) -> watch::Receiver<()> {
        self.changed_tx.subscribe()
    }

    async fn reload(&self) -> Result<(), ConfigError> {
        let raw = read_to_string(&self.config_path).await?;

        let unchanged = self.snapshot.read().await.raw == raw;
        if unchanged {
            return Ok(());
        }

        let (devices, sinks) = match model::parse(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, path = %self.config_path.display(), "config reload failed, keeping previous configuration");
                return Err(e);
            }
        };

        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.devices = devices;
            snapshot.sinks = sinks;
            snapshot.raw = raw;
        }
        debug!(path = %self.config_path.display(), "config reloaded");
        let _ = self.changed_tx.send(());
        Ok(())
    }

    async fn remote_stations(&self) -> Vec<RemoteStation> {
        self.state.read().await.remote_stations.clone()
    }

    async fn save_remote_station(&self, station: RemoteStation) -> Result<(), ConfigError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .remote_stations
            .iter_mut()
            .find(|s| s.station_id == station.station_id)
        {
            *existing = station;
        } else {
            state.remote_stations.push(station);
        }
        self.persist_state(&state).await
    }

    async fn delete_remote_station(&self, station_id: &str) -> Result<(), ConfigError> {
        let mut state = self.state.write().await;
        state.remote_stations.retain(|s| s.station_id != station_id);
        self.persist_state(&state).await
    }

    async fn grpc_client_station_id(&self) -> Option<String> {
        self.state.read().await.grpc_client_station_id.clone()
    }

    async fn save_grpc_client_station_id(&self, station_id: &str) -> Result<(), ConfigError> {
        let mut state = self.state.write().await;
        state.grpc_client_station_id = Some(station_id.to_owned());
        self.persist_state(&state).await
    }
}

async fn read_to_string(path: &PathBuf) -> Result<String, ConfigError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Write-to-temp-then-rename, so a crash mid-write never leaves a truncated
/// state file behind (same durability shape as the teacher's journal
/// fsync-then-rename checkpoint).
async fn write_atomic(path: &PathBuf, contents: &str) -> Result<(), ConfigError> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|source| ConfigError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_types::SinkDescriptor as _Sd;

    async fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn open_loads_devices_and_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
                [[device]]
                name = "k1"
                type = "davis"
                hostname = "1.2.3.4"
                port = 22222
            "#,
        )
        .await;
        let state_path = dir.path().join("state.toml");

        let provider = TomlConfigProvider::open(config_path, state_path).await.unwrap();
        assert_eq!(provider.devices().await.len(), 1);
        let _: _Sd = provider.sinks().await;
    }

    #[tokio::test]
    async fn reload_notifies_subscribers_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
                [[device]]
                name = "k1"
                type = "davis"
                hostname = "1.2.3.4"
                port = 22222
            "#,
        )
        .await;
        let state_path = dir.path().join("state.toml");
        let provider = TomlConfigProvider::open(config_path.clone(), state_path).await.unwrap();

        let mut rx = provider.subscribe();
        tokio::fs::write(
            &config_path,
            r#"
                [[device]]
                name = "k1"
                type = "davis"
                hostname = "1.2.3.4"
                port = 22222

                [[device]]
                name = "k2"
                type = "campbell"
                hostname = "1.2.3.5"
                port = 22222
            "#,
        )
        .await
        .unwrap();

        provider.reload().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(provider.devices().await.len(), 2);
    }

    #[tokio::test]
    async fn reload_is_noop_when_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, "").await;
        let state_path = dir.path().join("state.toml");
        let provider = TomlConfigProvider::open(config_path, state_path).await.unwrap();

        let mut rx = provider.subscribe();
        provider.reload().await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn reload_keeps_previous_snapshot_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
                [[device]]
                name = "k1"
                type = "davis"
                hostname = "1.2.3.4"
                port = 22222
            "#,
        )
        .await;
        let state_path = dir.path().join("state.toml");
        let provider = TomlConfigProvider::open(config_path.clone(), state_path).await.unwrap();

        tokio::fs::write(&config_path, "not [ valid toml").await.unwrap();
        assert!(provider.reload().await.is_err());
        assert_eq!(provider.devices().await.len(), 1);
    }

    #[tokio::test]
    async fn remote_station_round_trips_through_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, "").await;
        let state_path = dir.path().join("state.toml");
        let provider = TomlConfigProvider::open(config_path, state_path.clone()).await.unwrap();

        let station = RemoteStation {
            station_id: "abc123".to_owned(),
            last_seen: chrono::Utc::now(),
            timeseries_enabled: true,
            grpc_broadcast_enabled: false,
        };
        provider.save_remote_station(station.clone()).await.unwrap();
        assert_eq!(provider.remote_stations().await, vec![station.clone()]);

        let reopened = TomlConfigProvider::open(dir.path().join("config.toml"), state_path)
            .await
            .unwrap();
        assert_eq!(reopened.remote_stations().await, vec![station]);
    }

    #[tokio::test]
    async fn grpc_client_station_id_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, "").await;
        let state_path = dir.path().join("state.toml");
        let provider = TomlConfigProvider::open(config_path, state_path.clone()).await.unwrap();

        assert_eq!(provider.grpc_client_station_id().await, None);
        provider.save_grpc_client_station_id("issued-id").await.unwrap();
        assert_eq!(provider.grpc_client_station_id().await, Some("issued-id".to_owned()));

        let reopened = TomlConfigProvider::open(dir.path().join("config.toml"), state_path)
            .await
            .unwrap();
        assert_eq!(reopened.grpc_client_station_id().await, Some("issued-id".to_owned()));
    }
}

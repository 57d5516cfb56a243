//! Daemon CLI surface: `--config-backend`, `--config`, `--debug`, grounded
//! on the teacher's `streamer` binary's use of `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which storage engine backs the configuration provider.
///
/// The configuration store's own storage engine is out of this daemon's
/// scope; only the file-backed provider is implemented here.
/// [`ConfigBackend::Sqlite`] is accepted on the command line (matching the
/// documented CLI surface) but rejected at startup with a clear error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigBackend {
    File,
    Sqlite,
}

#[derive(Debug, Parser)]
#[command(name = "remoteweatherd", version, about = "Concurrent weather-station ingest and fan-out daemon")]
pub struct Cli {
    /// Which configuration backend to use.
    #[arg(long, value_enum, default_value = "file")]
    pub config_backend: ConfigBackend,

    /// Path to the declarative configuration file.
    #[arg(long, default_value = "remoteweather.toml")]
    pub config: PathBuf,

    /// Enable debug-level logging.
    #[arg(long)]
    pub debug: bool,
}

//! Top-level daemon error: covers the fatal startup failures that abort the
//! daemon after logging — failing to open a primary listener port, or
//! failing to connect to a mandatory time-series store.

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] weather_config::ConfigError),
    #[error("time-series store error: {0}")]
    TimeSeries(#[from] weather_timeseries::TimeSeriesError),
    #[error("{0}")]
    Fatal(String),
}

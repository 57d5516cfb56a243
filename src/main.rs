use clap::Parser;
use remoteweather::{Cli, DaemonError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = remoteweather::run(cli).await {
        tracing::error!(error = %e, "remoteweather exited with a fatal error");
        std::process::exit(exit_code_for(&e));
    }
}

fn exit_code_for(_error: &DaemonError) -> i32 {
    1
}

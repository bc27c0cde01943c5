//! `eventgate` entry point.

use clap::Parser;
use eventgate_cli::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("eventgate v{} starting", env!("CARGO_PKG_VERSION"));

    run(Cli::parse()).await
}

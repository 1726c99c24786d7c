//! tollgate CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use tollgate::GatewayBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let json_logs = cli.json_logs;
    let config = cli.into_config()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("tollgate v{}", env!("CARGO_PKG_VERSION"));

    let mut gateway = GatewayBuilder::new(config).build()?;

    gateway.run().await?;

    info!("Goodbye!");
    Ok(())
}

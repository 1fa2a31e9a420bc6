use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod config;
mod db;
mod domain;
mod gateway;
mod grpc;
mod health;
mod notifier;
mod outbox;
mod users;

#[derive(Debug, Parser)]
#[command(name = "users-service", about = "User management service")]
struct Cli {
    /// Path to the configuration file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::Config::load(&cli.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.app.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        name = %cfg.app.name,
        version = %cfg.app.version,
        "starting"
    );

    app::run(cfg).await
}

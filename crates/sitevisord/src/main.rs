//! sitevisor daemon - supervises site commands

use anyhow::Result;
use sitevisor_core::constants;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;
mod handlers;
mod killer;
mod supervisor;

use daemon::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sitevisord=info,sitevisor_db=info,sitevisor_runtime=info,sitevisor::command=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("sitevisor daemon starting...");

    let home = constants::sitevisor_home();
    if !home.exists() {
        std::fs::create_dir_all(&home)?;
        info!("Created sitevisor home directory: {}", home.display());
    }

    let socket_path = constants::socket_path();
    if socket_path.exists() {
        match tokio::net::UnixStream::connect(&socket_path).await {
            Ok(_) => {
                error!("Daemon is already running");
                std::process::exit(1);
            }
            Err(_) => {
                info!("Removing stale socket file");
                std::fs::remove_file(&socket_path)?;
            }
        }
    }

    let daemon = Daemon::new().await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = daemon.run() => {
            if let Err(e) = result {
                error!("Daemon error: {}", e);
                return Err(e.into());
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    daemon.shutdown().await;
    info!("Daemon shutdown complete");
    Ok(())
}

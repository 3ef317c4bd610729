//! sitevisor CLI - manage sites and supervised commands

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::set_json_mode(cli.json);

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sitevisor={0},sitevisor_ipc={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let result = match cli.command {
        Commands::Site(args) => site::execute(args).await,
        Commands::Command(args) => command::execute(args).await,
        Commands::Start { target } => start::execute(&target).await,
        Commands::Stop { target } => stop::execute(&target).await,
        Commands::Restart { target } => restart::execute(&target).await,
        Commands::Preview { target } => preview::execute(&target).await,
        Commands::Logs(args) => logs::execute(args).await,
        Commands::Runs { target, limit } => runs::execute(&target, limit).await,
        Commands::Flush { target } => flush::execute(&target).await,
        Commands::Status => status::execute().await,
        Commands::Ping => ping::execute().await,
        Commands::Kill => kill::execute().await,
        Commands::Notify(args) => notify::execute(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

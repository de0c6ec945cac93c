//! Mnemo Entry Point
//!
//! One-shot commands print a JSON document on stdout; `watch` keeps the
//! index current until interrupted. Logs always go to stderr.

use clap::Parser;
use mnemo_server::cli::{self, Cli, Command};
use mnemo_server::{MemoryManager, ServerResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = cli.config();
    tracing::debug!("Memory root: {:?}", config.data_dir);

    let manager = MemoryManager::new();
    let engine = manager.engine(&config).await?;

    match cli.command {
        Command::Watch => cli::watch(engine).await,
        command => {
            let output = cli::execute(&command, &engine).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

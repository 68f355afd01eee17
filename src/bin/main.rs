//! Model registry binary.
//!
//! Runs the gRPC registry server, or talks to a running one to manage models
//! and transfer their versions.

use clap::Parser;
use model_registry::{
    cli::commands::Commands,
    cli::handlers::{handle_config, handle_model, handle_server, handle_version},
    config::ServiceConfig,
};
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = cli.command.logging();
    let level = logging.get_effective_level();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.parse().unwrap_or(LevelFilter::INFO).into())
                .parse_lossy(logging.log_filter.as_deref().unwrap_or("")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    debug!(level, "Logging initialized");

    match cli.command {
        Commands::Server(cmd) => handle_server(ServiceConfig::load(&cmd.config)?).await?,
        Commands::Config(cmd) => handle_config(&ServiceConfig::load(&cmd.config)?)?,
        Commands::Model(cmd) => handle_model(cmd).await?,
        Commands::Version(cmd) => handle_version(cmd).await?,
    }

    Ok(())
}

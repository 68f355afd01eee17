pub mod config;
pub mod model;
pub mod server;
pub mod version;

pub use config::ConfigCommand;
pub use model::{ModelAction, ModelCommand};
pub use server::ServerCommand;
pub use version::{VersionAction, VersionCommand};

use super::options::LoggingOptions;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Start the model registry server
    Server(ServerCommand),
    /// Print the effective server configuration
    Config(ConfigCommand),
    /// Manage models on a running registry
    Model(ModelCommand),
    /// Push, pull and list model versions on a running registry
    Version(VersionCommand),
}

impl Commands {
    pub fn logging(&self) -> &LoggingOptions {
        match self {
            Commands::Server(cmd) => &cmd.logging,
            Commands::Config(cmd) => &cmd.logging,
            Commands::Model(cmd) => &cmd.logging,
            Commands::Version(cmd) => &cmd.logging,
        }
    }
}

//! Model management CLI commands

use crate::cli::options::{parse_key_value, ConnectionOptions, LoggingOptions};
use clap::{Args, Subcommand};

/// Model management commands
#[derive(Args)]
pub struct ModelCommand {
    #[command(flatten)]
    pub connection: ConnectionOptions,

    #[command(flatten)]
    pub logging: LoggingOptions,

    #[command(subcommand)]
    pub action: ModelAction,
}

/// Model management actions
#[derive(Subcommand)]
pub enum ModelAction {
    /// Create a model, or replace the user data of an existing one
    Create {
        model_id: String,

        /// User data entries, as KEY=VALUE
        #[arg(long = "user-data", value_parser = parse_key_value)]
        user_data: Vec<(String, String)>,
    },

    /// Delete a model and all of its versions
    Delete { model_id: String },

    /// List models
    List {
        /// Only retrieve these models
        model_ids: Vec<String>,

        /// Number of models retrieved per request
        #[arg(long, default_value_t = 100)]
        page_size: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

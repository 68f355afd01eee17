//! Model version CLI commands

use crate::cli::options::{parse_key_value, ConnectionOptions, LoggingOptions};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct VersionCommand {
    #[command(flatten)]
    pub connection: ConnectionOptions,

    #[command(flatten)]
    pub logging: LoggingOptions,

    #[command(subcommand)]
    pub action: VersionAction,
}

#[derive(Subcommand)]
pub enum VersionAction {
    /// Upload a file as a new version of a model
    Push {
        model_id: String,

        /// File holding the version data
        file: PathBuf,

        /// Replace this existing version instead of creating the next one
        #[arg(long, default_value_t = 0)]
        version_number: u32,

        /// Flag the version as archived
        #[arg(long)]
        archived: bool,

        /// User data entries, as KEY=VALUE
        #[arg(long = "user-data", value_parser = parse_key_value)]
        user_data: Vec<(String, String)>,
    },

    /// Download the data of a version
    Pull {
        model_id: String,

        /// Version to download, 0 for the latest
        #[arg(long, default_value_t = 0)]
        version_number: u32,

        /// Output file, standard output when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the versions of a model
    List {
        model_id: String,

        /// Only retrieve these versions
        #[arg(long = "versions", value_delimiter = ',')]
        version_numbers: Vec<u32>,

        /// Number of versions retrieved per request
        #[arg(long, default_value_t = 100)]
        page_size: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

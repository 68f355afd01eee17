use crate::cli::options::LoggingOptions;
use crate::config::ConfigArgs;
use clap::Args;

/// Resolve the configuration the server would run with and print it as JSON.
#[derive(Args)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub logging: LoggingOptions,
}

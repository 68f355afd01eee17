use clap::Args;

/// Logging options shared by every command
#[derive(Debug, Clone, Default, Args)]
pub struct LoggingOptions {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Explicit tracing filter directives, e.g. "model_registry=debug,tonic=info"
    #[arg(long, env = "MODEL_REGISTRY_LOG", global = true)]
    pub log_filter: Option<String>,
}

impl LoggingOptions {
    pub fn get_effective_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Options locating the registry server
#[derive(Debug, Clone, Args)]
pub struct ConnectionOptions {
    /// Registry endpoint
    #[arg(long, env = "MODEL_REGISTRY_ENDPOINT", default_value = "http://127.0.0.1:9002")]
    pub endpoint: String,

    /// Size of the chunks sent on upload, in bytes
    #[arg(long, default_value_t = crate::client::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

/// Parse a `key=value` pair given on the command line.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in {:?}", s))
}

//! Configuration management for the model registry.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/model-registry/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `MODEL_REGISTRY_`, sections separated by `__`)
//! 5. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones.
//!
//! # Environment Variables
//!
//! - `MODEL_REGISTRY_SERVER__PORT` - Listening port
//! - `MODEL_REGISTRY_STORAGE__ENGINE` - Storage engine (`duckdb` or `memory`)
//! - `MODEL_REGISTRY_STORAGE__CONNECTION` - DuckDB database path or `:memory:`
//! - `MODEL_REGISTRY_TRANSFER__CHUNK_SIZE` - Download chunk size in bytes

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const SYSTEM_CONFIG: &str = "/etc/model-registry/config.toml";
const ENV_PREFIX: &str = "MODEL_REGISTRY";

/// Storage engines understood by [`crate::storage::create_backend`].
pub const SUPPORTED_ENGINES: &[&str] = &["duckdb", "memory"];

/// Command-line arguments overriding the configuration files
#[derive(Debug, Default, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage engine type (duckdb, memory)
    #[arg(long)]
    pub engine: Option<String>,

    /// Storage engine connection string
    #[arg(long)]
    pub engine_connection: Option<String>,

    /// Size of the chunks streamed back on downloads, in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Upper bound on how long a request waits for the backend to become ready
    #[arg(long, value_name = "MILLISECONDS")]
    pub backend_wait_timeout_ms: Option<u64>,

    /// Path to TLS certificate
    #[arg(long, value_name = "FILE")]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key
    #[arg(long, value_name = "FILE")]
    pub tls_key: Option<PathBuf>,

    /// Path to CA certificate for client authentication
    #[arg(long, value_name = "FILE")]
    pub tls_client_ca: Option<PathBuf>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cap applied to every wait on the backend, on top of the client deadline
    #[serde(default)]
    pub backend_wait_timeout_ms: Option<u64>,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
    #[serde(default)]
    pub tls_client_ca: Option<PathBuf>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine type
    pub engine: String,
    /// Connection string
    #[serde(default = "default_connection")]
    pub connection: String,
}

/// Payload transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl ServiceConfig {
    /// Load configuration from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name(SYSTEM_CONFIG).required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: ServiceConfig = builder.build()?.try_deserialize()?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &ConfigArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(timeout) = args.backend_wait_timeout_ms {
            self.server.backend_wait_timeout_ms = Some(timeout);
        }
        if let Some(engine) = &args.engine {
            self.storage.engine = engine.clone();
        }
        if let Some(connection) = &args.engine_connection {
            self.storage.connection = connection.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            self.transfer.chunk_size = chunk_size;
        }
        if args.tls_cert.is_some() {
            self.server.tls_cert = args.tls_cert.clone();
        }
        if args.tls_key.is_some() {
            self.server.tls_key = args.tls_key.clone();
        }
        if args.tls_client_ca.is_some() {
            self.server.tls_client_ca = args.tls_client_ca.clone();
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_ENGINES.contains(&self.storage.engine.as_str()) {
            return Err(Error::Config(format!(
                "unsupported storage engine {:?}, expected one of {:?}",
                self.storage.engine, SUPPORTED_ENGINES
            )));
        }
        if self.transfer.chunk_size == 0 {
            return Err(Error::Config("transfer.chunk_size must be greater than 0".into()));
        }
        if self.transfer.chunk_size > self.server.max_message_size {
            return Err(Error::Config(format!(
                "transfer.chunk_size ({}) exceeds server.max_message_size ({})",
                self.transfer.chunk_size, self.server.max_message_size
            )));
        }
        if self.server.tls_cert.is_some() != self.server.tls_key.is_some() {
            return Err(Error::Config(
                "server.tls_cert and server.tls_key must be provided together".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))
    }

    pub fn backend_wait_timeout(&self) -> Option<Duration> {
        self.server.backend_wait_timeout_ms.map(Duration::from_millis)
    }
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

fn default_connection() -> String {
    ":memory:".to_string()
}

fn default_chunk_size() -> usize {
    5 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::load(&ConfigArgs::default()).unwrap();
        assert_eq!(config.transfer.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.storage.engine, "duckdb");
        assert_eq!(config.storage.connection, ":memory:");
        assert!(config.backend_wait_timeout().is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let args = ConfigArgs {
            port: Some(7000),
            engine: Some("memory".into()),
            chunk_size: Some(1024),
            backend_wait_timeout_ms: Some(250),
            ..Default::default()
        };

        let config = ServiceConfig::load(&args).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.storage.engine, "memory");
        assert_eq!(config.transfer.chunk_size, 1024);
        assert_eq!(config.backend_wait_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.listen_addr().unwrap().port(), 7000);
    }

    #[test]
    fn test_config_file_layer() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[storage]\nengine = \"memory\"\n\n[transfer]\nchunk_size = 64").unwrap();

        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = ServiceConfig::load(&args).unwrap();
        assert_eq!(config.storage.engine, "memory");
        assert_eq!(config.transfer.chunk_size, 64);
        assert_eq!(config.server.port, 9002);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let zero_chunks = ConfigArgs {
            chunk_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(ServiceConfig::load(&zero_chunks), Err(Error::Config(_))));

        let unknown_engine = ConfigArgs {
            engine: Some("postgres".into()),
            ..Default::default()
        };
        assert!(matches!(ServiceConfig::load(&unknown_engine), Err(Error::Config(_))));

        let lone_cert = ConfigArgs {
            tls_cert: Some("cert.pem".into()),
            ..Default::default()
        };
        assert!(matches!(ServiceConfig::load(&lone_cert), Err(Error::Config(_))));
    }
}

//! Error types for the model registry service.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for registry setup.
pub type Result<T> = result::Result<T, Error>;

/// The error type for loading and validating the service configuration.
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl StdError for Error {}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

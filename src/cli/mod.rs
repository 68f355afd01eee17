//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Server management
//! - Configuration inspection
//! - Model and version transfers against a running registry

pub mod commands;
pub mod handlers;
pub mod options;

pub use handlers::{handle_config, handle_model, handle_server, handle_version};

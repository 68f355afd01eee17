//! Versioned machine-learning model registry.
//!
//! Models and their successive versions are kept by a [`storage::StorageBackend`]
//! and served over gRPC by [`service::RegistryService`], which moves version
//! payloads as chunked streams and verifies them against their SHA-256 hash.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod hash;
pub mod service;
pub mod storage;

pub use client::RegistryClient;
pub use error::{Error, Result};
pub use service::RegistryService;
pub use storage::{BackendError, StorageBackend};

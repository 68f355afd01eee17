//! Storage backends for models and their versions.
//!
//! This module provides the storage contract and its implementations:
//! - `memory`: ephemeral in-process store, mostly for tests and development
//! - `duckdb`: persistent SQL store backed by an embedded DuckDB database
//!
//! Each backend implements the `StorageBackend` trait, so the transport layer
//! can be pointed at any of them without changing.

pub mod duckdb;
pub mod error;
pub mod memory;

pub use self::duckdb::DuckDbBackend;
pub use self::error::BackendError;
pub use self::memory::InMemoryBackend;

use crate::config::StorageConfig;
use crate::hash::compute_sha256_hash;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound applied by every backend to listing calls, including uncapped ones.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Resolve a caller supplied listing limit, `0` meaning "no explicit cap".
pub fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        MAX_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}

/// Metadata of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    pub model_id: String,
    /// Latest version number ever assigned, 0 means that no version was created yet.
    pub latest_version_number: u32,
    pub user_data: HashMap<String, String>,
}

impl ModelInfo {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    pub fn with_user_data(mut self, user_data: HashMap<String, String>) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Metadata of a particular version of a model.
///
/// The payload itself is never part of this structure, it is only reachable
/// through [`StorageBackend::retrieve_model_version_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub model_id: String,
    pub version_number: u32,
    pub creation_timestamp: DateTime<Utc>,
    pub archived: bool,
    pub data_hash: String,
    pub data_size: u64,
    pub user_data: HashMap<String, String>,
}

/// Arguments used to create or update a model version.
#[derive(Debug, Clone)]
pub struct VersionArgs {
    /// Requested version number, 0 lets the backend assign the next one.
    pub version_number: u32,
    pub creation_timestamp: DateTime<Utc>,
    pub archived: bool,
    pub data_hash: String,
    pub data: Bytes,
    pub user_data: HashMap<String, String>,
}

impl VersionArgs {
    /// Build arguments for a new version holding `data`, hashing it on the way.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            version_number: 0,
            creation_timestamp: Utc::now(),
            archived: false,
            data_hash: compute_sha256_hash(&data),
            data,
            user_data: HashMap::new(),
        }
    }

    pub fn with_version_number(mut self, version_number: u32) -> Self {
        self.version_number = version_number;
        self
    }

    pub fn with_user_data(mut self, user_data: HashMap<String, String>) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_creation_timestamp(mut self, creation_timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = creation_timestamp;
        self
    }

    pub(crate) fn into_version_info(self, model_id: &str, version_number: u32) -> (VersionInfo, Bytes) {
        let info = VersionInfo {
            model_id: model_id.to_owned(),
            version_number,
            creation_timestamp: self.creation_timestamp,
            archived: self.archived,
            data_hash: self.data_hash,
            data_size: self.data.len() as u64,
            user_data: self.user_data,
        };
        (info, self.data)
    }
}

/// Decide which number a created or updated version receives.
///
/// `existing` tells whether `requested` already designates a stored version.
pub(crate) fn assign_version_number(
    model_id: &str,
    latest_version_number: u32,
    requested: u32,
    existing: bool,
) -> Result<u32, BackendError> {
    if requested != 0 && existing {
        return Ok(requested);
    }
    let Some(next_version_number) = latest_version_number.checked_add(1) else {
        return Err(BackendError::Storage(format!(
            "model {:?} has no version number left to assign",
            model_id
        )));
    };
    if requested == 0 || requested == next_version_number {
        return Ok(next_version_number);
    }
    Err(BackendError::InvalidVersionNumber {
        model_id: model_id.to_owned(),
        version_number: requested,
        next_version_number,
    })
}

/// Storage contract every model registry backend satisfies.
///
/// All methods may be called concurrently; implementations serialize writes
/// to a given model so that version numbers never collide.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Release every resource held by the backend, later calls fail.
    async fn destroy(&self) -> Result<(), BackendError>;

    /// Create the model if absent, otherwise replace its user data.
    async fn create_or_update_model(&self, model_info: ModelInfo) -> Result<ModelInfo, BackendError>;

    async fn retrieve_model_info(&self, model_id: &str) -> Result<ModelInfo, BackendError>;

    async fn has_model(&self, model_id: &str) -> Result<bool, BackendError>;

    /// Delete a model together with all of its versions.
    async fn delete_model(&self, model_id: &str) -> Result<(), BackendError>;

    /// List model ids ordered by id, `limit == 0` meaning no explicit cap.
    async fn list_models(&self, offset: usize, limit: usize) -> Result<Vec<String>, BackendError>;

    /// Create a new version, or replace an existing one when `args.version_number` designates it.
    ///
    /// Unknown models are created on the fly with empty user data.
    async fn create_or_update_model_version(
        &self,
        model_id: &str,
        args: VersionArgs,
    ) -> Result<VersionInfo, BackendError>;

    /// Retrieve a version's metadata, version 0 designating the latest existing version.
    async fn retrieve_model_version_info(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<VersionInfo, BackendError>;

    /// Retrieve a version's payload, version 0 designating the latest existing version.
    async fn retrieve_model_version_data(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<Bytes, BackendError>;

    async fn delete_model_version(&self, model_id: &str, version_number: u32) -> Result<(), BackendError>;

    /// List versions numbered `>= initial_version_number` in increasing order.
    async fn list_model_version_infos(
        &self,
        model_id: &str,
        initial_version_number: u32,
        limit: usize,
    ) -> Result<Vec<VersionInfo>, BackendError>;
}

/// Open the backend described by the storage configuration.
pub fn create_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, BackendError> {
    match config.engine.as_str() {
        "memory" => Ok(Arc::new(InMemoryBackend::new())),
        "duckdb" => Ok(Arc::new(DuckDbBackend::new(&config.connection)?)),
        other => Err(BackendError::Storage(format!(
            "unsupported storage engine {other:?} (expected \"duckdb\" or \"memory\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(0), MAX_LIST_LIMIT);
        assert_eq!(effective_limit(10), 10);
        assert_eq!(effective_limit(MAX_LIST_LIMIT + 1), MAX_LIST_LIMIT);
    }

    #[test]
    fn test_assign_version_number() {
        assert_eq!(assign_version_number("m", 0, 0, false).unwrap(), 1);
        assert_eq!(assign_version_number("m", 4, 0, false).unwrap(), 5);
        assert_eq!(assign_version_number("m", 4, 5, false).unwrap(), 5);
        assert_eq!(assign_version_number("m", 4, 2, true).unwrap(), 2);

        assert_eq!(assign_version_number("m", u32::MAX, 3, true).unwrap(), 3);
        assert!(matches!(
            assign_version_number("m", u32::MAX, 0, false),
            Err(BackendError::Storage(_))
        ));

        let err = assign_version_number("m", 4, 7, false).unwrap_err();
        assert!(matches!(
            err,
            BackendError::InvalidVersionNumber { version_number: 7, next_version_number: 5, .. }
        ));
    }

    #[test]
    fn test_version_args_hash_matches_data() {
        let args = VersionArgs::new(vec![1u8, 2, 3]);
        assert_eq!(args.data_hash, compute_sha256_hash(&[1, 2, 3]));
        assert_eq!(args.version_number, 0);
    }
}

//! In-memory storage backend.
//!
//! Every model lives in a `BTreeMap` keyed by id so listings are ordered, and
//! every version of a model in a `BTreeMap` keyed by number. A single
//! `RwLock` guards the whole state; writers hold it for the duration of one
//! operation, which serializes version number assignment.

use super::{
    assign_version_number, effective_limit, BackendError, ModelInfo, StorageBackend, VersionArgs,
    VersionInfo,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

struct StoredVersion {
    info: VersionInfo,
    data: Bytes,
}

struct StoredModel {
    latest_version_number: u32,
    user_data: HashMap<String, String>,
    versions: BTreeMap<u32, StoredVersion>,
}

impl StoredModel {
    fn new(user_data: HashMap<String, String>) -> Self {
        Self {
            latest_version_number: 0,
            user_data,
            versions: BTreeMap::new(),
        }
    }

    fn info(&self, model_id: &str) -> ModelInfo {
        ModelInfo {
            model_id: model_id.to_owned(),
            latest_version_number: self.latest_version_number,
            user_data: self.user_data.clone(),
        }
    }

    /// Find a stored version, 0 designating the highest existing one.
    fn version(&self, model_id: &str, version_number: u32) -> Result<&StoredVersion, BackendError> {
        if self.versions.is_empty() {
            return Err(BackendError::unknown_model_version(model_id, 0));
        }
        let found = if version_number == 0 {
            self.versions.values().next_back()
        } else {
            self.versions.get(&version_number)
        };
        found.ok_or_else(|| BackendError::unknown_model_version(model_id, version_number))
    }
}

#[derive(Default)]
struct State {
    destroyed: bool,
    models: BTreeMap<String, StoredModel>,
}

impl State {
    fn check(&self) -> Result<(), BackendError> {
        if self.destroyed {
            Err(BackendError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn model(&self, model_id: &str) -> Result<&StoredModel, BackendError> {
        self.check()?;
        self.models
            .get(model_id)
            .ok_or_else(|| BackendError::unknown_model(model_id))
    }
}

/// Ephemeral backend keeping everything in process memory.
#[derive(Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn destroy(&self) -> Result<(), BackendError> {
        let mut state = self.state.write();
        state.models.clear();
        state.destroyed = true;
        Ok(())
    }

    async fn create_or_update_model(&self, model_info: ModelInfo) -> Result<ModelInfo, BackendError> {
        let mut state = self.state.write();
        state.check()?;
        let model = state
            .models
            .entry(model_info.model_id.clone())
            .or_insert_with(|| StoredModel::new(HashMap::new()));
        model.user_data = model_info.user_data;
        Ok(model.info(&model_info.model_id))
    }

    async fn retrieve_model_info(&self, model_id: &str) -> Result<ModelInfo, BackendError> {
        let state = self.state.read();
        Ok(state.model(model_id)?.info(model_id))
    }

    async fn has_model(&self, model_id: &str) -> Result<bool, BackendError> {
        let state = self.state.read();
        state.check()?;
        Ok(state.models.contains_key(model_id))
    }

    async fn delete_model(&self, model_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.write();
        state.check()?;
        state
            .models
            .remove(model_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::unknown_model(model_id))
    }

    async fn list_models(&self, offset: usize, limit: usize) -> Result<Vec<String>, BackendError> {
        let state = self.state.read();
        state.check()?;
        Ok(state
            .models
            .keys()
            .skip(offset)
            .take(effective_limit(limit))
            .cloned()
            .collect())
    }

    async fn create_or_update_model_version(
        &self,
        model_id: &str,
        args: VersionArgs,
    ) -> Result<VersionInfo, BackendError> {
        let mut state = self.state.write();
        state.check()?;
        let model = state
            .models
            .entry(model_id.to_owned())
            .or_insert_with(|| StoredModel::new(HashMap::new()));

        let existing = model.versions.contains_key(&args.version_number);
        let version_number = assign_version_number(
            model_id,
            model.latest_version_number,
            args.version_number,
            existing,
        )?;

        let (info, data) = args.into_version_info(model_id, version_number);
        model.versions.insert(
            version_number,
            StoredVersion {
                info: info.clone(),
                data,
            },
        );
        model.latest_version_number = model.latest_version_number.max(version_number);

        debug!(model_id, version_number, updated = existing, "Stored model version");
        Ok(info)
    }

    async fn retrieve_model_version_info(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<VersionInfo, BackendError> {
        let state = self.state.read();
        let model = state.model(model_id)?;
        Ok(model.version(model_id, version_number)?.info.clone())
    }

    async fn retrieve_model_version_data(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<Bytes, BackendError> {
        let state = self.state.read();
        let model = state.model(model_id)?;
        Ok(model.version(model_id, version_number)?.data.clone())
    }

    async fn delete_model_version(&self, model_id: &str, version_number: u32) -> Result<(), BackendError> {
        let mut state = self.state.write();
        state.check()?;
        let model = state
            .models
            .get_mut(model_id)
            .ok_or_else(|| BackendError::unknown_model(model_id))?;
        let resolved = model.version(model_id, version_number)?.info.version_number;
        model.versions.remove(&resolved);
        Ok(())
    }

    async fn list_model_version_infos(
        &self,
        model_id: &str,
        initial_version_number: u32,
        limit: usize,
    ) -> Result<Vec<VersionInfo>, BackendError> {
        let state = self.state.read();
        let model = state.model(model_id)?;
        Ok(model
            .versions
            .range(initial_version_number..)
            .take(effective_limit(limit))
            .map(|(_, version)| version.info.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_destroyed_backend_rejects_calls() {
        let backend = InMemoryBackend::new();
        backend.create_or_update_model(ModelInfo::new("m")).await.unwrap();
        backend.destroy().await.unwrap();

        assert_eq!(backend.has_model("m").await, Err(BackendError::Destroyed));
        assert_eq!(backend.list_models(0, 0).await, Err(BackendError::Destroyed));
    }

    #[tokio::test]
    async fn test_version_zero_resolves_to_highest_existing() {
        let backend = InMemoryBackend::new();
        for payload in [&b"one"[..], b"two", b"three"] {
            backend
                .create_or_update_model_version("m", VersionArgs::new(payload.to_vec()))
                .await
                .unwrap();
        }
        backend.delete_model_version("m", 3).await.unwrap();

        let latest = backend.retrieve_model_version_info("m", 0).await.unwrap();
        assert_eq!(latest.version_number, 2);
        assert_eq!(
            backend.retrieve_model_info("m").await.unwrap().latest_version_number,
            3
        );
    }
}

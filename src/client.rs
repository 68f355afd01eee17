//! Client for the model registry gRPC service.
//!
//! Wraps the generated tonic client with the registry's transfer conventions:
//! uploads are sent as a header followed by body chunks with their size and
//! hash computed locally, downloads are reassembled and checked against the
//! stored hash, and listings follow pagination handles to the end.

use crate::hash::compute_sha256_hash;
use crate::service::proto::{
    model_registry_client::ModelRegistryClient, ns_timestamp_from_time, CreateOrUpdateModelRequest,
    CreateVersionRequestChunk, DeleteModelRequest, ModelInfo, ModelVersionInfo,
    RetrieveModelsRequest, RetrieveVersionDataRequest, RetrieveVersionInfosRequest,
};
use crate::service::registry::chunk_payload;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Error types for registry client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Request failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("Hash mismatch for version {version_number} of model {model_id:?}: expected {expected}, received {actual}")]
    HashMismatch {
        model_id: String,
        version_number: u32,
        expected: String,
        actual: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// gRPC code of a failed request, if the server answered.
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            ClientError::Status(status) => Some(status.code()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Metadata attached to an uploaded version.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// 0 creates the next version, an existing number replaces it
    pub version_number: u32,
    pub archived: bool,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub user_data: HashMap<String, String>,
}

#[derive(Clone)]
pub struct RegistryClient {
    inner: ModelRegistryClient<Channel>,
    chunk_size: usize,
}

impl RegistryClient {
    /// Connect to a registry at `endpoint`, e.g. `http://127.0.0.1:9002`.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|_| ClientError::InvalidEndpoint(endpoint))?
            .connect()
            .await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            inner: ModelRegistryClient::new(channel)
                .max_decoding_message_size(DEFAULT_MAX_MESSAGE_SIZE)
                .max_encoding_message_size(DEFAULT_MAX_MESSAGE_SIZE),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Size of the body chunks sent on upload.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn create_or_update_model(
        &mut self,
        model_id: &str,
        user_data: HashMap<String, String>,
    ) -> Result<()> {
        self.inner
            .create_or_update_model(CreateOrUpdateModelRequest {
                model_info: Some(ModelInfo {
                    model_id: model_id.to_string(),
                    user_data,
                }),
            })
            .await?;
        Ok(())
    }

    pub async fn delete_model(&mut self, model_id: &str) -> Result<()> {
        self.inner
            .delete_model(DeleteModelRequest {
                model_id: model_id.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Retrieve one page of models, returning it with the handle of the next page.
    pub async fn retrieve_models(
        &mut self,
        model_ids: Vec<String>,
        models_count: u32,
        model_handle: String,
    ) -> Result<(Vec<ModelInfo>, String)> {
        let reply = self
            .inner
            .retrieve_models(RetrieveModelsRequest {
                model_ids,
                models_count,
                model_handle,
            })
            .await?
            .into_inner();
        Ok((reply.model_infos, reply.next_model_handle))
    }

    /// List every model, `page_size` at a time.
    pub async fn list_models(&mut self, page_size: u32) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut handle = String::new();
        loop {
            let (page, next_handle) = self.retrieve_models(Vec::new(), page_size, handle).await?;
            if page.is_empty() {
                return Ok(models);
            }
            models.extend(page);
            handle = next_handle;
        }
    }

    /// Upload `data` as a version of `model_id`.
    pub async fn push_version(
        &mut self,
        model_id: &str,
        data: Bytes,
        options: PushOptions,
    ) -> Result<ModelVersionInfo> {
        let header = CreateVersionRequestChunk::header(ModelVersionInfo {
            model_id: model_id.to_string(),
            version_number: options.version_number,
            creation_timestamp: options
                .creation_timestamp
                .as_ref()
                .map(ns_timestamp_from_time)
                .unwrap_or(0),
            archived: options.archived,
            data_hash: compute_sha256_hash(&data),
            data_size: data.len() as u64,
            user_data: options.user_data,
        });
        let bodies = if data.is_empty() {
            Vec::new()
        } else {
            chunk_payload(data, self.chunk_size)
        };
        debug!(model_id, chunks = bodies.len(), "Pushing model version");

        let chunks = async_stream::stream! {
            yield header;
            for body in bodies {
                yield CreateVersionRequestChunk::body(body);
            }
        };
        let reply = self.inner.create_version(chunks).await?.into_inner();
        reply
            .version_info
            .ok_or_else(|| ClientError::InvalidResponse("reply does not include a `version_info`".into()))
    }

    /// Download the payload of a version, 0 designating the latest one.
    pub async fn pull_version_data(&mut self, model_id: &str, version_number: u32) -> Result<Bytes> {
        let mut stream = self
            .inner
            .retrieve_version_data(RetrieveVersionDataRequest {
                model_id: model_id.to_string(),
                version_number,
            })
            .await?
            .into_inner();

        let mut data = BytesMut::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.message().await? {
            data.extend_from_slice(&chunk.data_chunk);
            chunks += 1;
        }
        // Even an empty payload is sent as one chunk.
        if chunks == 0 {
            return Err(ClientError::InvalidResponse(
                "version data stream ended without any chunk".into(),
            ));
        }
        Ok(data.freeze())
    }

    /// Download a version together with its metadata, checking the payload against the stored hash.
    pub async fn pull_version(
        &mut self,
        model_id: &str,
        version_number: u32,
    ) -> Result<(ModelVersionInfo, Bytes)> {
        let (infos, _) = self
            .retrieve_version_infos(model_id, vec![version_number], 1, String::new())
            .await?;
        let info = infos
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("no version info returned".into()))?;

        let data = self.pull_version_data(model_id, info.version_number).await?;
        let actual = compute_sha256_hash(&data);
        if actual != info.data_hash {
            return Err(ClientError::HashMismatch {
                model_id: model_id.to_string(),
                version_number: info.version_number,
                expected: info.data_hash,
                actual,
            });
        }
        Ok((info, data))
    }

    /// Retrieve one page of version infos, returning it with the handle of the next page.
    pub async fn retrieve_version_infos(
        &mut self,
        model_id: &str,
        version_numbers: Vec<u32>,
        versions_count: u32,
        version_handle: String,
    ) -> Result<(Vec<ModelVersionInfo>, String)> {
        let reply = self
            .inner
            .retrieve_version_infos(RetrieveVersionInfosRequest {
                model_id: model_id.to_string(),
                version_numbers,
                versions_count,
                version_handle,
            })
            .await?
            .into_inner();
        Ok((reply.version_infos, reply.next_version_handle))
    }

    /// List every version of a model in increasing order, `page_size` at a time.
    pub async fn list_version_infos(
        &mut self,
        model_id: &str,
        page_size: u32,
    ) -> Result<Vec<ModelVersionInfo>> {
        let mut versions = Vec::new();
        let mut handle = String::new();
        loop {
            let (page, next_handle) = self
                .retrieve_version_infos(model_id, Vec::new(), page_size, handle)
                .await?;
            if page.is_empty() {
                return Ok(versions);
            }
            versions.extend(page);
            handle = next_handle;
        }
    }
}

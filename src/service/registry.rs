//! gRPC façade of the model registry.
//!
//! Every handler waits for the backend through the readiness promise, then
//! translates the wire request into storage calls:
//! - model CRUD is passed through
//! - listings are paginated with decimal handles
//! - version payloads are uploaded as a header followed by body chunks, fully
//!   buffered and verified before anything reaches the backend
//! - version payloads are downloaded as fixed-size chunks

use super::context::RequestContext;
use super::handle::{format_handle, page, parse_handle};
use super::promise::BackendPromise;
use super::proto::{
    create_version_request_chunk::Msg,
    model_registry_server::{ModelRegistry, ModelRegistryServer},
    time_from_ns_timestamp, CreateOrUpdateModelReply, CreateOrUpdateModelRequest,
    CreateVersionReply, CreateVersionRequestChunk, DeleteModelReply, DeleteModelRequest,
    ModelInfo, ModelVersionInfo, RetrieveModelsReply, RetrieveModelsRequest,
    RetrieveVersionDataReplyChunk, RetrieveVersionDataRequest, RetrieveVersionInfosReply,
    RetrieveVersionInfosRequest,
};
use crate::hash::compute_sha256_hash;
use crate::storage::{BackendError, StorageBackend, VersionArgs, VersionInfo};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tonic::{metadata::MetadataMap, Request, Response, Status, Streaming};
use tracing::{debug, info};

type VersionDataStream = Pin<Box<dyn Stream<Item = Result<RetrieveVersionDataReplyChunk, Status>> + Send + 'static>>;

/// Upper bound on the buffer reserved up-front from a client-declared size.
const MAX_UPLOAD_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Map a backend failure to the status returned to the client.
///
/// Not-found and numbering errors keep their message, anything else is
/// reported as internal with `action` describing what was attempted.
fn backend_status(err: BackendError, action: impl FnOnce() -> String) -> Status {
    match err {
        BackendError::UnknownModel { .. } | BackendError::UnknownModelVersion { .. } => {
            Status::not_found(err.to_string())
        }
        BackendError::InvalidVersionNumber { .. } => Status::invalid_argument(err.to_string()),
        BackendError::Destroyed | BackendError::Storage(_) => {
            Status::internal(format!("unexpected error while {}: {}", action(), err))
        }
    }
}

/// Split a payload in chunks of at most `chunk_size` bytes, an empty payload giving one empty chunk.
pub fn chunk_payload(data: Bytes, chunk_size: usize) -> Vec<Bytes> {
    if data.is_empty() {
        return vec![Bytes::new()];
    }
    let chunk_size = chunk_size.max(1);
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

/// Position a sequential version listing resumes from: one past the last
/// returned version, or unchanged when nothing was returned.
fn next_version_position(version_infos: &[VersionInfo], initial_position: u64) -> u64 {
    version_infos
        .last()
        .map(|info| u64::from(info.version_number) + 1)
        .unwrap_or(initial_position)
}

/// Implementation of the `modelregistry.ModelRegistry` service.
#[derive(Clone)]
pub struct RegistryService {
    backend: Arc<BackendPromise>,
    chunk_size: usize,
    backend_wait_timeout: Option<Duration>,
}

impl RegistryService {
    /// Create the service; `chunk_size` bounds the chunks emitted by `RetrieveVersionData`.
    pub fn new(backend: Arc<BackendPromise>, chunk_size: usize) -> Self {
        Self {
            backend,
            chunk_size,
            backend_wait_timeout: None,
        }
    }

    /// Cap every wait on the backend, on top of the client deadline.
    pub fn with_backend_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.backend_wait_timeout = timeout;
        self
    }

    /// Wrap the service in its tonic server, accepting messages up to `max_message_size` bytes.
    pub fn into_server(self, max_message_size: usize) -> ModelRegistryServer<Self> {
        ModelRegistryServer::new(self)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size)
    }

    fn context(&self, metadata: &MetadataMap) -> RequestContext {
        RequestContext::from_metadata(metadata, self.backend_wait_timeout)
    }

    async fn backend(&self, ctx: &RequestContext) -> Result<Arc<dyn StorageBackend>, Status> {
        Ok(self.backend.wait(ctx).await?)
    }
}

#[tonic::async_trait]
impl ModelRegistry for RegistryService {
    async fn create_or_update_model(
        &self,
        request: Request<CreateOrUpdateModelRequest>,
    ) -> Result<Response<CreateOrUpdateModelReply>, Status> {
        let ctx = self.context(request.metadata());
        let model_info = request
            .into_inner()
            .model_info
            .ok_or_else(|| Status::invalid_argument("request does not include a `model_info`"))?;
        info!(model_id = %model_info.model_id, user_data = ?model_info.user_data, "CreateOrUpdateModel");

        let backend = self.backend(&ctx).await?;
        let model_id = model_info.model_id.clone();
        backend
            .create_or_update_model(model_info.into())
            .await
            .map_err(|e| backend_status(e, || format!("creating model {:?}", model_id)))?;

        Ok(Response::new(CreateOrUpdateModelReply {}))
    }

    async fn delete_model(
        &self,
        request: Request<DeleteModelRequest>,
    ) -> Result<Response<DeleteModelReply>, Status> {
        let ctx = self.context(request.metadata());
        let req = request.into_inner();
        info!(model_id = %req.model_id, "DeleteModel");

        let backend = self.backend(&ctx).await?;
        backend
            .delete_model(&req.model_id)
            .await
            .map_err(|e| backend_status(e, || format!("deleting model {:?}", req.model_id)))?;

        Ok(Response::new(DeleteModelReply {}))
    }

    async fn retrieve_models(
        &self,
        request: Request<RetrieveModelsRequest>,
    ) -> Result<Response<RetrieveModelsReply>, Status> {
        let ctx = self.context(request.metadata());
        let req = request.into_inner();
        info!(
            model_ids = ?req.model_ids,
            models_count = req.models_count,
            model_handle = %req.model_handle,
            "RetrieveModels"
        );

        let offset: usize = parse_handle(&req.model_handle, "model_handle")?;
        let count = req.models_count as usize;
        let backend = self.backend(&ctx).await?;

        let mut model_infos = Vec::new();
        let consumed = if req.model_ids.is_empty() {
            let model_ids = backend
                .list_models(offset, count)
                .await
                .map_err(|e| backend_status(e, || "retrieving models".to_string()))?;
            for model_id in &model_ids {
                match backend.retrieve_model_info(model_id).await {
                    Ok(model_info) => model_infos.push(ModelInfo::from(model_info)),
                    // Deleted since it was listed.
                    Err(BackendError::UnknownModel { .. }) => {}
                    Err(e) => return Err(backend_status(e, || "retrieving models".to_string())),
                }
            }
            model_ids.len()
        } else {
            let model_ids = page(&req.model_ids, offset, count);
            for model_id in model_ids {
                let model_info = backend
                    .retrieve_model_info(model_id)
                    .await
                    .map_err(|e| backend_status(e, || "retrieving models".to_string()))?;
                model_infos.push(ModelInfo::from(model_info));
            }
            model_ids.len()
        };

        Ok(Response::new(RetrieveModelsReply {
            model_infos,
            next_model_handle: format_handle(offset + consumed),
        }))
    }

    async fn create_version(
        &self,
        request: Request<Streaming<CreateVersionRequestChunk>>,
    ) -> Result<Response<CreateVersionReply>, Status> {
        let ctx = self.context(request.metadata());
        let mut stream = request.into_inner();
        info!("CreateVersion(stream=...)");

        let header = match stream.message().await? {
            None => return Err(Status::invalid_argument("empty request")),
            Some(CreateVersionRequestChunk {
                msg: Some(Msg::Header(header)),
            }) => header,
            Some(_) => {
                return Err(Status::invalid_argument(
                    "first request chunk does not include a header",
                ))
            }
        };
        let version_info = header
            .version_info
            .ok_or_else(|| Status::invalid_argument("header does not include a `version_info`"))?;
        info!(
            model_id = %version_info.model_id,
            version_number = version_info.version_number,
            data_size = version_info.data_size,
            "CreateVersion header received"
        );

        let expected_size = version_info.data_size;
        let mut data = Vec::with_capacity(expected_size.min(MAX_UPLOAD_PREALLOCATION) as usize);
        while let Some(chunk) = stream.message().await? {
            let body = match chunk.msg {
                Some(Msg::Body(body)) => body,
                _ => {
                    return Err(Status::invalid_argument(
                        "subsequent request chunk does not include a body",
                    ))
                }
            };
            data.extend_from_slice(&body.data_chunk);
            debug!(chunk_size = body.data_chunk.len(), received = data.len(), "Received version data chunk");

            if data.len() as u64 > expected_size {
                return Err(Status::invalid_argument(format!(
                    "received more data than expected, expected {} bytes, received {} bytes",
                    expected_size,
                    data.len()
                )));
            }
        }

        if (data.len() as u64) < expected_size {
            return Err(Status::invalid_argument(format!(
                "stream ended while having not received the expected data, expected {} bytes, received {} bytes",
                expected_size,
                data.len()
            )));
        }

        let data_hash = compute_sha256_hash(&data);
        if !version_info.data_hash.is_empty() && version_info.data_hash != data_hash {
            return Err(Status::invalid_argument(format!(
                "received data did not match the expected hash, expected {:?}, received {:?}",
                version_info.data_hash, data_hash
            )));
        }

        let backend = self.backend(&ctx).await?;
        let model_id = version_info.model_id;
        let args = VersionArgs {
            version_number: version_info.version_number,
            creation_timestamp: time_from_ns_timestamp(version_info.creation_timestamp),
            archived: version_info.archived,
            data_hash,
            data: Bytes::from(data),
            user_data: version_info.user_data,
        };
        let created = backend
            .create_or_update_model_version(&model_id, args)
            .await
            .map_err(|e| backend_status(e, || format!("creating a version for model {:?}", model_id)))?;

        Ok(Response::new(CreateVersionReply {
            version_info: Some(created.into()),
        }))
    }

    async fn retrieve_version_infos(
        &self,
        request: Request<RetrieveVersionInfosRequest>,
    ) -> Result<Response<RetrieveVersionInfosReply>, Status> {
        let ctx = self.context(request.metadata());
        let req = request.into_inner();
        info!(
            model_id = %req.model_id,
            version_numbers = ?req.version_numbers,
            versions_count = req.versions_count,
            version_handle = %req.version_handle,
            "RetrieveVersionInfos"
        );

        let count = req.versions_count as usize;

        if req.version_numbers.is_empty() {
            // Handles run one past u32::MAX once the last possible version was listed.
            let initial_position: u64 = parse_handle(&req.version_handle, "version_handle")?;
            let backend = self.backend(&ctx).await?;
            let mut version_infos = backend
                .list_model_version_infos(
                    &req.model_id,
                    u32::try_from(initial_position).unwrap_or(u32::MAX),
                    count,
                )
                .await
                .map_err(|e| backend_status(e, || format!("retrieving versions of model {:?}", req.model_id)))?;
            version_infos.retain(|info| u64::from(info.version_number) >= initial_position);

            let next_position = next_version_position(&version_infos, initial_position);

            return Ok(Response::new(RetrieveVersionInfosReply {
                version_infos: version_infos.into_iter().map(ModelVersionInfo::from).collect(),
                next_version_handle: format_handle(next_position),
            }));
        }

        // With explicit version numbers the handle is an offset in the requested
        // list, not a version number, so duplicates and 0 are paged exactly once.
        let offset: usize = parse_handle(&req.version_handle, "version_handle")?;
        let backend = self.backend(&ctx).await?;
        let version_numbers = page(&req.version_numbers, offset, count);
        let mut version_infos = Vec::with_capacity(version_numbers.len());
        for &version_number in version_numbers {
            let version_info = backend
                .retrieve_model_version_info(&req.model_id, version_number)
                .await
                .map_err(|e| {
                    backend_status(e, || {
                        format!("retrieving version \"{}\" for model {:?}", version_number, req.model_id)
                    })
                })?;
            version_infos.push(ModelVersionInfo::from(version_info));
        }

        Ok(Response::new(RetrieveVersionInfosReply {
            version_infos,
            next_version_handle: format_handle(offset + version_numbers.len()),
        }))
    }

    type RetrieveVersionDataStream = VersionDataStream;

    async fn retrieve_version_data(
        &self,
        request: Request<RetrieveVersionDataRequest>,
    ) -> Result<Response<Self::RetrieveVersionDataStream>, Status> {
        let ctx = self.context(request.metadata());
        let req = request.into_inner();
        info!(model_id = %req.model_id, version_number = req.version_number, "RetrieveVersionData");

        let backend = self.backend(&ctx).await?;
        let data = backend
            .retrieve_model_version_data(&req.model_id, req.version_number)
            .await
            .map_err(|e| {
                backend_status(e, || {
                    format!("retrieving version \"{}\" for model {:?}", req.version_number, req.model_id)
                })
            })?;

        let chunks = chunk_payload(data, self.chunk_size);
        debug!(chunks = chunks.len(), "Sending version data");
        let stream = tokio_stream::iter(
            chunks
                .into_iter()
                .map(|data_chunk| Ok(RetrieveVersionDataReplyChunk { data_chunk })),
        );
        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use tonic::Code;

    fn version_info(version_number: u32) -> VersionInfo {
        VersionInfo {
            model_id: "m".into(),
            version_number,
            creation_timestamp: Utc::now(),
            archived: false,
            data_hash: String::new(),
            data_size: 0,
            user_data: HashMap::new(),
        }
    }

    #[test]
    fn test_next_version_position() {
        assert_eq!(next_version_position(&[], 4), 4);
        assert_eq!(next_version_position(&[version_info(2), version_info(5)], 0), 6);

        // The last possible version moves the handle past it instead of stalling.
        let last = u64::from(u32::MAX);
        assert_eq!(next_version_position(&[version_info(u32::MAX)], last), last + 1);
        assert_eq!(next_version_position(&[], last + 1), last + 1);
    }

    #[test]
    fn test_chunk_payload() {
        let data = Bytes::from_static(b"0123456789");
        let chunks = chunk_payload(data.clone(), 4);
        assert_eq!(chunks.iter().map(Bytes::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(chunks.concat(), data.to_vec());

        assert_eq!(chunk_payload(data.clone(), 10).len(), 1);
        assert_eq!(chunk_payload(data, 100).len(), 1);
    }

    #[test]
    fn test_empty_payload_is_one_empty_chunk() {
        let chunks = chunk_payload(Bytes::new(), 4);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn test_backend_status_mapping() {
        let status = backend_status(BackendError::unknown_model_version("m", 0), || unreachable!());
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "model \"m\" doesn't have any version yet");

        let status = backend_status(BackendError::Storage("disk full".into()), || "deleting model \"m\"".into());
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "unexpected error while deleting model \"m\": disk full");

        let status = backend_status(
            BackendError::InvalidVersionNumber {
                model_id: "m".into(),
                version_number: 9,
                next_version_number: 2,
            },
            || unreachable!(),
        );
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(
            backend_status(BackendError::unknown_model("m"), || unreachable!()).code(),
            Code::NotFound
        );
    }
}

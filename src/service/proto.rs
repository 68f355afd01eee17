//! Wire messages of the `modelregistry.ModelRegistry` gRPC service.
//!
//! Messages are declared by hand with `prost` derives; the server trait and
//! client stubs are generated by `build.rs` and included at the bottom.

use crate::storage::{ModelInfo as StoredModelInfo, VersionInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelInfo {
    #[prost(string, tag = "1")]
    pub model_id: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "2")]
    pub user_data: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelVersionInfo {
    #[prost(string, tag = "1")]
    pub model_id: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub version_number: u32,
    /// Nanoseconds since the Unix epoch, 0 meaning "now" on creation.
    #[prost(fixed64, tag = "3")]
    pub creation_timestamp: u64,
    #[prost(bool, tag = "4")]
    pub archived: bool,
    #[prost(string, tag = "5")]
    pub data_hash: ::prost::alloc::string::String,
    #[prost(fixed64, tag = "6")]
    pub data_size: u64,
    #[prost(map = "string, string", tag = "7")]
    pub user_data: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateOrUpdateModelRequest {
    #[prost(message, optional, tag = "1")]
    pub model_info: Option<ModelInfo>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct CreateOrUpdateModelReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteModelRequest {
    #[prost(string, tag = "1")]
    pub model_id: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteModelReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveModelsRequest {
    #[prost(string, repeated, tag = "1")]
    pub model_ids: Vec<String>,
    #[prost(uint32, tag = "2")]
    pub models_count: u32,
    #[prost(string, tag = "3")]
    pub model_handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveModelsReply {
    #[prost(message, repeated, tag = "1")]
    pub model_infos: Vec<ModelInfo>,
    #[prost(string, tag = "2")]
    pub next_model_handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVersionRequestChunk {
    #[prost(oneof = "create_version_request_chunk::Msg", tags = "1, 2")]
    pub msg: Option<create_version_request_chunk::Msg>,
}

pub mod create_version_request_chunk {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Header {
        #[prost(message, optional, tag = "1")]
        pub version_info: Option<super::ModelVersionInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Body {
        #[prost(bytes = "bytes", tag = "1")]
        pub data_chunk: ::bytes::Bytes,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "1")]
        Header(Header),
        #[prost(message, tag = "2")]
        Body(Body),
    }
}

impl CreateVersionRequestChunk {
    pub fn header(version_info: ModelVersionInfo) -> Self {
        Self {
            msg: Some(create_version_request_chunk::Msg::Header(
                create_version_request_chunk::Header {
                    version_info: Some(version_info),
                },
            )),
        }
    }

    pub fn body(data_chunk: impl Into<::bytes::Bytes>) -> Self {
        Self {
            msg: Some(create_version_request_chunk::Msg::Body(
                create_version_request_chunk::Body {
                    data_chunk: data_chunk.into(),
                },
            )),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVersionReply {
    #[prost(message, optional, tag = "1")]
    pub version_info: Option<ModelVersionInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveVersionInfosRequest {
    #[prost(string, tag = "1")]
    pub model_id: ::prost::alloc::string::String,
    #[prost(uint32, repeated, tag = "2")]
    pub version_numbers: Vec<u32>,
    #[prost(uint32, tag = "3")]
    pub versions_count: u32,
    #[prost(string, tag = "4")]
    pub version_handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveVersionInfosReply {
    #[prost(message, repeated, tag = "1")]
    pub version_infos: Vec<ModelVersionInfo>,
    #[prost(string, tag = "2")]
    pub next_version_handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveVersionDataRequest {
    #[prost(string, tag = "1")]
    pub model_id: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub version_number: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RetrieveVersionDataReplyChunk {
    #[prost(bytes = "bytes", tag = "1")]
    pub data_chunk: ::bytes::Bytes,
}

/// Convert a wire timestamp, 0 designating the current time.
pub fn time_from_ns_timestamp(timestamp: u64) -> DateTime<Utc> {
    if timestamp == 0 {
        return Utc::now();
    }
    // Anything past i64::MAX nanoseconds (year 2262) saturates.
    DateTime::from_timestamp_nanos(i64::try_from(timestamp).unwrap_or(i64::MAX))
}

/// Convert a point in time to a wire timestamp, clamping pre-epoch values to 0.
pub fn ns_timestamp_from_time(timestamp: &DateTime<Utc>) -> u64 {
    timestamp
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}

impl From<VersionInfo> for ModelVersionInfo {
    fn from(info: VersionInfo) -> Self {
        Self {
            creation_timestamp: ns_timestamp_from_time(&info.creation_timestamp),
            model_id: info.model_id,
            version_number: info.version_number,
            archived: info.archived,
            data_hash: info.data_hash,
            data_size: info.data_size,
            user_data: info.user_data,
        }
    }
}

impl From<StoredModelInfo> for ModelInfo {
    fn from(info: StoredModelInfo) -> Self {
        Self {
            model_id: info.model_id,
            user_data: info.user_data,
        }
    }
}

impl From<ModelInfo> for StoredModelInfo {
    fn from(info: ModelInfo) -> Self {
        StoredModelInfo::new(info.model_id).with_user_data(info.user_data)
    }
}

include!(concat!(env!("OUT_DIR"), "/modelregistry.ModelRegistry.rs"));

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_timestamp_conversion() {
        let now = Utc::now();
        let ns = ns_timestamp_from_time(&now);
        assert_eq!(time_from_ns_timestamp(ns), now);

        let before = Utc::now();
        assert!(time_from_ns_timestamp(0) >= before);
    }

    #[test]
    fn test_header_and_body_are_distinguished_on_the_wire() {
        let header = CreateVersionRequestChunk::header(ModelVersionInfo {
            model_id: "m".into(),
            data_size: 3,
            ..Default::default()
        });
        let decoded = CreateVersionRequestChunk::decode(header.encode_to_vec().as_slice()).unwrap();
        assert!(matches!(decoded.msg, Some(create_version_request_chunk::Msg::Header(_))));

        let body = CreateVersionRequestChunk::body(&b"abc"[..]);
        let decoded = CreateVersionRequestChunk::decode(body.encode_to_vec().as_slice()).unwrap();
        match decoded.msg {
            Some(create_version_request_chunk::Msg::Body(body)) => assert_eq!(&body.data_chunk[..], b"abc"),
            other => panic!("unexpected message {:?}", other),
        }
    }
}

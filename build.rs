//! Build script generating the gRPC service stubs for the model registry.
//!
//! Messages are declared with `prost` derives in `src/service/proto.rs`; only
//! the service plumbing (server trait and client) is generated here, so no
//! `protoc` installation is required.

use tonic_build::manual::{Builder, Method, Service};

const PROTO_MODULE: &str = "crate::service::proto";

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("{PROTO_MODULE}::{input}"))
        .output_type(format!("{PROTO_MODULE}::{output}"))
        .codec_path("tonic::codec::ProstCodec")
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let service = Service::builder()
        .name("ModelRegistry")
        .package("modelregistry")
        .method(
            method(
                "create_or_update_model",
                "CreateOrUpdateModel",
                "CreateOrUpdateModelRequest",
                "CreateOrUpdateModelReply",
            )
            .build(),
        )
        .method(method("delete_model", "DeleteModel", "DeleteModelRequest", "DeleteModelReply").build())
        .method(
            method(
                "retrieve_models",
                "RetrieveModels",
                "RetrieveModelsRequest",
                "RetrieveModelsReply",
            )
            .build(),
        )
        .method(
            method(
                "create_version",
                "CreateVersion",
                "CreateVersionRequestChunk",
                "CreateVersionReply",
            )
            .client_streaming()
            .build(),
        )
        .method(
            method(
                "retrieve_version_infos",
                "RetrieveVersionInfos",
                "RetrieveVersionInfosRequest",
                "RetrieveVersionInfosReply",
            )
            .build(),
        )
        .method(
            method(
                "retrieve_version_data",
                "RetrieveVersionData",
                "RetrieveVersionDataRequest",
                "RetrieveVersionDataReplyChunk",
            )
            .server_streaming()
            .build(),
        )
        .build();

    Builder::new().compile(&[service]);
}

//! Common test utilities for the model registry integration tests

#![allow(dead_code)]

use model_registry::client::RegistryClient;
use model_registry::service::proto::model_registry_client::ModelRegistryClient;
use model_registry::service::{BackendPromise, Promise, RegistryService};
use model_registry::storage::{InMemoryBackend, StorageBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub struct TestServer {
    pub endpoint: String,
    pub promise: Arc<BackendPromise>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn set_backend(&self, backend: Arc<dyn StorageBackend>) {
        self.promise.set(backend).unwrap();
    }

    pub async fn client(&self) -> RegistryClient {
        RegistryClient::connect(self.endpoint.clone()).await.unwrap()
    }

    pub async fn raw_client(&self) -> ModelRegistryClient<Channel> {
        ModelRegistryClient::connect(self.endpoint.clone()).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a server on an ephemeral port whose backend is not set yet.
pub async fn start_server(chunk_size: usize, backend_wait_timeout: Option<Duration>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint = format!("http://127.0.0.1:{}", addr.port());

    let promise: Arc<BackendPromise> = Arc::new(Promise::new());
    let service = RegistryService::new(promise.clone(), chunk_size)
        .with_backend_wait_timeout(backend_wait_timeout);
    let incoming = TcpListenerStream::new(listener);

    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(service.into_server(MAX_MESSAGE_SIZE))
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });

    TestServer {
        endpoint,
        promise,
        handle,
    }
}

/// Start a server backed by a fresh in-memory backend.
pub async fn start_memory_server(chunk_size: usize) -> TestServer {
    let server = start_server(chunk_size, None).await;
    server.set_backend(Arc::new(InMemoryBackend::new()));
    server
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

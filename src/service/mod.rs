//! gRPC transport layer of the model registry.
//!
//! - `proto`: wire messages and generated server/client stubs
//! - `registry`: the service implementation
//! - `promise`: readiness gate handlers wait on until the backend is open
//! - `context`: per-request deadlines
//! - `handle`: pagination handles

pub mod context;
pub mod handle;
pub mod promise;
pub mod proto;
pub mod registry;

pub use context::RequestContext;
pub use promise::{BackendPromise, Promise, PromiseError};
pub use registry::RegistryService;

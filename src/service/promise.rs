//! Single-assignment promise gating requests on backend readiness.
//!
//! The server starts listening before its backend is open; handlers wait on
//! the promise, bounded by their request deadline, until the bootstrap task
//! assigns it.

use super::context::RequestContext;
use crate::storage::StorageBackend;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tonic::Status;

/// Promise resolving to the backend every handler dispatches to.
pub type BackendPromise = Promise<Arc<dyn StorageBackend>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    #[error("promise has already been set")]
    AlreadySet,
    #[error("deadline exceeded while waiting for the backend to be ready")]
    DeadlineExceeded,
    #[error("promise was abandoned before being set")]
    Closed,
}

impl From<PromiseError> for Status {
    fn from(err: PromiseError) -> Self {
        match err {
            PromiseError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
            PromiseError::AlreadySet | PromiseError::Closed => Status::internal(err.to_string()),
        }
    }
}

/// A value assigned exactly once and awaited by any number of tasks.
pub struct Promise<T> {
    slot: watch::Sender<Option<T>>,
}

impl<T: Clone> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Promise<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Assign the value, waking every waiter. Fails if it was assigned before.
    pub fn set(&self, value: T) -> Result<(), PromiseError> {
        let assigned = self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        });
        if assigned {
            Ok(())
        } else {
            Err(PromiseError::AlreadySet)
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Current value, if assigned.
    pub fn get(&self) -> Option<T> {
        (*self.slot.borrow()).clone()
    }

    /// Wait for the value until the context deadline passes.
    ///
    /// Dropping the returned future abandons the wait without side effects.
    pub async fn wait(&self, ctx: &RequestContext) -> Result<T, PromiseError> {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let mut rx = self.slot.subscribe();
        let assigned = async move {
            let value = rx.wait_for(Option::is_some).await;
            value.map(|slot| (*slot).clone()).map_err(|_| PromiseError::Closed)
        };

        let value = match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, assigned)
                .await
                .map_err(|_| PromiseError::DeadlineExceeded)??,
            None => assigned.await?,
        };
        value.ok_or(PromiseError::Closed)
    }
}

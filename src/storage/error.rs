//! Errors reported by storage backends.

use std::error::Error as StdError;
use std::fmt;

/// The error type returned by every `StorageBackend` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The model does not exist
    UnknownModel { model_id: String },
    /// The model exists but the version does not, version 0 meaning it has none at all
    UnknownModelVersion { model_id: String, version_number: u32 },
    /// The requested version number is neither new, next nor existing
    InvalidVersionNumber {
        model_id: String,
        version_number: u32,
        next_version_number: u32,
    },
    /// The backend was destroyed
    Destroyed,
    /// Any other failure of the underlying store
    Storage(String),
}

impl BackendError {
    pub fn unknown_model(model_id: impl Into<String>) -> Self {
        BackendError::UnknownModel {
            model_id: model_id.into(),
        }
    }

    pub fn unknown_model_version(model_id: impl Into<String>, version_number: u32) -> Self {
        BackendError::UnknownModelVersion {
            model_id: model_id.into(),
            version_number,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::UnknownModel { model_id } => write!(f, "no model {:?} found", model_id),
            BackendError::UnknownModelVersion {
                model_id,
                version_number: 0,
            } => write!(f, "model {:?} doesn't have any version yet", model_id),
            BackendError::UnknownModelVersion {
                model_id,
                version_number,
            } => write!(f, "no version \"{}\" for model {:?} found", version_number, model_id),
            BackendError::InvalidVersionNumber {
                model_id,
                version_number,
                next_version_number,
            } => write!(
                f,
                "version \"{}\" can't be created for model {:?}, expected an existing version or \"{}\"",
                version_number, model_id, next_version_number
            ),
            BackendError::Destroyed => write!(f, "backend has been destroyed"),
            BackendError::Storage(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for BackendError {}

impl From<duckdb::Error> for BackendError {
    fn from(err: duckdb::Error) -> Self {
        BackendError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Storage(format!("invalid user data encoding: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_version_messages() {
        assert_eq!(
            BackendError::unknown_model_version("m1", 0).to_string(),
            "model \"m1\" doesn't have any version yet"
        );
        assert_eq!(
            BackendError::unknown_model_version("m1", 3).to_string(),
            "no version \"3\" for model \"m1\" found"
        );
        assert_eq!(BackendError::unknown_model("m1").to_string(), "no model \"m1\" found");
    }
}

//! Error types for the application registry
//!
//! Stores surface [`StoreError`]; the registry service folds those into one of
//! the request outcomes carried by [`RegistryError`].

use thiserror::Error;

use crate::domain::DomainError;
use crate::secret::SecretError;

/// Failure raised by an [`ApplicationStore`](crate::store::ApplicationStore)
/// or by the pieces the registry runs before touching one.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{message}")]
    Validation { message: String },

    #[error("application already exists in the database")]
    AlreadyExists { field: &'static str },

    #[error("{message}")]
    NotFound { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::NotFound {
            message: message.into(),
        }
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::Validation {
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a failed registry operation, one per HTTP-equivalent status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// HTTP status a controller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::BadRequest(_) => 400,
            RegistryError::NotFound(_) => 404,
            RegistryError::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RegistryError::BadRequest(m) | RegistryError::NotFound(m) | RegistryError::Internal(m) => m,
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { message } => RegistryError::BadRequest(message),
            e @ StoreError::AlreadyExists { .. } => RegistryError::BadRequest(e.to_string()),
            StoreError::NotFound { message } => RegistryError::NotFound(message),
            other => RegistryError::Internal(other.to_string()),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

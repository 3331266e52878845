//! Cloud engine error types

use thiserror::Error;

/// Errors raised while building, planning or applying a resource graph
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("Resource '{from}' references unknown resource '{to}'")]
    UnknownResource { from: String, to: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Output '{attribute}' of '{resource}' is not available")]
    UnresolvedOutput { resource: String, attribute: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

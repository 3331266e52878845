//! Service error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("KeyVaultUri is not configured")]
    MissingVaultUri,

    #[error("KeyVaultUri '{uri}' is invalid: {reason}")]
    InvalidVaultUri { uri: String, reason: String },

    #[error("Key vault DNS lookup failed for '{host}': {message}")]
    Resolution { host: String, message: String },

    #[error("No Azure credential available: {0}")]
    Credential(String),

    #[error("Key vault request failed: {status} {body}")]
    Vault {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Missing or malformed settings, as opposed to an unreachable vault
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::MissingVaultUri | AppError::InvalidVaultUri { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

//! Azure provider error types

use thiserror::Error;
use weatherdeck_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install: https://aka.ms/azure-cli")]
    AzNotFound,

    #[error("az is not logged in: {0}")]
    NotLoggedIn(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Resource '{resource}' is missing input '{key}'")]
    MissingInput { resource: String, key: String },

    #[error("Unsupported resource type: {0}")]
    UnsupportedResource(String),

    #[error("Unexpected az output: {0}")]
    UnexpectedOutput(String),

    #[error("Key vault '{vault}' belongs to tenant {actual}, expected {expected}")]
    TenantMismatch {
        vault: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to package {path}: {message}")]
    Packaging { path: String, message: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AzureError {
    /// Whether az reported that the target does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            AzureError::CommandFailed(message) => {
                let message = message.to_lowercase();
                message.contains("resourcenotfound")
                    || message.contains("resourcegroupnotfound")
                    || message.contains("could not be found")
                    || message.contains("was not found")
                    || message.contains("does not exist")
            }
            _ => false,
        }
    }
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::NotLoggedIn(message) => CloudError::AuthenticationFailed(message),
            AzureError::MissingInput { .. } | AzureError::TenantMismatch { .. } => {
                CloudError::InvalidConfig(err.to_string())
            }
            AzureError::UnsupportedResource(kind) => CloudError::UnsupportedResource(kind),
            // provider messages are surfaced verbatim
            AzureError::CommandFailed(message) => CloudError::ProviderError(message),
            other => CloudError::ProviderError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let gone = AzureError::CommandFailed(
            "ERROR: (ResourceNotFound) The Resource 'Microsoft.Web/sites/demo' was not found."
                .to_string(),
        );
        assert!(gone.is_not_found());

        let conflict = AzureError::CommandFailed(
            "ERROR: (StorageAccountAlreadyTaken) The storage account named demosa is already taken."
                .to_string(),
        );
        assert!(!conflict.is_not_found());
    }

    #[test]
    fn test_conversion_keeps_provider_message() {
        let err: CloudError =
            AzureError::CommandFailed("(Conflict) name already taken".to_string()).into();
        assert!(matches!(err, CloudError::ProviderError(m) if m == "(Conflict) name already taken"));

        let err: CloudError = AzureError::MissingInput {
            resource: "demo-rg".to_string(),
            key: "location".to_string(),
        }
        .into();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}

//! Cloud provider trait definition

use crate::error::Result;
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output attributes reported by a provider after create/update
pub type ResourceOutputs = BTreeMap<String, serde_json::Value>;

/// Cloud provider abstraction trait
///
/// Providers only deal with one resource at a time: ordering, output
/// resolution and state bookkeeping belong to the [`Engine`](crate::Engine).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create a resource from fully resolved inputs
    async fn create(&self, resource: &ResourceConfig) -> Result<ResourceOutputs>;

    /// Bring an existing resource in line with new inputs
    ///
    /// Providers whose create commands are idempotent upserts can rely on the
    /// default implementation.
    async fn update(
        &self,
        resource: &ResourceConfig,
        _current: &ResourceState,
    ) -> Result<ResourceOutputs> {
        self.create(resource).await
    }

    /// Delete a resource recorded in the state
    async fn delete(&self, logical_name: &str, current: &ResourceState) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Resolved configuration handed to a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "storage-account")
    pub resource_type: String,

    /// Logical resource name
    pub id: String,

    /// Resolved inputs
    pub config: serde_json::Value,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            config,
        }
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a string configuration value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_config_accessors() {
        let config = ResourceConfig::new(
            "storage-account",
            "demo-sa",
            json!({"name": "demosa", "https_only": true, "tags": {"env": "dev"}}),
        );
        assert_eq!(config.key(), "storage-account:demo-sa");
        assert_eq!(config.get_str("name"), Some("demosa"));
        assert_eq!(config.get_config::<bool>("https_only"), Some(true));
        let tags: Option<BTreeMap<String, String>> = config.get_config("tags");
        assert_eq!(tags.unwrap()["env"], "dev");
        assert!(config.get_str("missing").is_none());
    }
}

//! Layered configuration the request handler reads from
//!
//! Keys are `:`-separated sections compared case-insensitively. Environment
//! variables spell the separator `__`; vault secret names spell it `--`
//! because neither allows a colon. The vault layer sits over the environment
//! and is replaced wholesale on every refresh.

use crate::vault::SecretSource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Current configuration values, read on every request
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn current(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct ConfigStore {
    environment: HashMap<String, String>,
    vault: RwLock<HashMap<String, String>>,
}

impl ConfigStore {
    /// Store seeded from the process environment
    pub fn from_env() -> Self {
        Self::with_environment(std::env::vars())
    }

    pub fn with_environment(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            environment: vars
                .into_iter()
                .map(|(key, value)| (environment_key(&key), value))
                .collect(),
            vault: RwLock::default(),
        }
    }

    /// Current value for `key`, vault first
    pub async fn get(&self, key: &str) -> Option<String> {
        let key = key.to_lowercase();
        if let Some(value) = self.vault.read().await.get(&key) {
            return Some(value.clone());
        }
        self.environment.get(&key).cloned()
    }

    /// Replace the vault layer with freshly loaded secrets
    pub async fn replace_secrets(&self, secrets: HashMap<String, String>) {
        let layer = secrets
            .into_iter()
            .map(|(name, value)| (secret_key(&name), value))
            .collect();
        *self.vault.write().await = layer;
    }

    pub async fn secret_count(&self) -> usize {
        self.vault.read().await.len()
    }
}

#[async_trait]
impl ConfigProvider for ConfigStore {
    async fn current(&self, key: &str) -> Option<String> {
        self.get(key).await
    }
}

/// Configuration key for an environment variable name
pub fn environment_key(name: &str) -> String {
    name.replace("__", ":").to_lowercase()
}

/// Configuration key for a vault secret name
pub fn secret_key(name: &str) -> String {
    name.replace("--", ":").to_lowercase()
}

/// Reload the vault layer every `every`
///
/// A failed reload keeps the values already loaded.
pub fn spawn_refresh(
    store: Arc<ConfigStore>,
    source: Arc<dyn SecretSource>,
    every: Duration,
) -> JoinHandle<()> {
    tracing::info!(
        interval_seconds = every.as_secs(),
        "Starting key vault refresh task"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; bootstrap already loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match source.load().await {
                Ok(secrets) => {
                    let count = secrets.len();
                    store.replace_secrets(secrets).await;
                    tracing::debug!(secrets = count, "Refreshed key vault configuration");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Key vault refresh failed, keeping previous values");
                }
            }
        }
    })
}

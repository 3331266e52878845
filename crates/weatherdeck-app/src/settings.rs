//! Service settings
//!
//! Loaded in this order, later sources winning:
//!
//! 1. the embedded `default.toml`
//! 2. an optional file named by `WEATHERDECK_CONFIG_FILE`
//! 3. `WEATHERDECK__SECTION__KEY` environment variables
//! 4. `KeyVaultUri`, the variable the hosting app service sets

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Names an extra settings file
pub const CONFIG_FILE_ENV: &str = "WEATHERDECK_CONFIG_FILE";

/// Prefix of `WEATHERDECK__*` overrides
pub const ENV_PREFIX: &str = "WEATHERDECK";

/// App setting carrying the vault address
pub const VAULT_URI_ENV: &str = "KeyVaultUri";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: Server,
    pub log: Log,
    pub vault: Vault,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Vault {
    pub uri: Option<String>,
    /// 0 disables refreshing
    pub refresh_interval_seconds: u64,
    pub api_version: String,
    pub request_timeout_seconds: u64,
}

impl Vault {
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_seconds > 0)
            .then(|| Duration::from_secs(self.refresh_interval_seconds))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Settings {
    /// Build settings from the defaults, an optional file and the environment
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_SETTINGS, FileFormat::Toml));

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(&file));
        }

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "vault.uri",
                std::env::var(VAULT_URI_ENV).ok().filter(|v| !v.is_empty()),
            )?;

        builder.build()?.try_deserialize()
    }

    /// Settings for the running process
    pub fn load() -> Result<Self, ConfigError> {
        Self::new(std::env::var(CONFIG_FILE_ENV).ok())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

//! Startup sequence
//!
//! Everything here finishes before the listener binds: a bad vault address
//! or an unreachable vault stops the process instead of serving requests
//! with missing configuration.

use crate::error::{AppError, Result};
use crate::settings::Settings;
use crate::store::{ConfigStore, spawn_refresh};
use crate::vault::{KeyVaultSecretSource, SecretSource};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

/// Configuration ready for the router
pub struct Bootstrapped {
    pub config: Arc<ConfigStore>,
    pub refresh: Option<JoinHandle<()>>,
}

/// Check the configured vault address
pub fn validate_vault_uri(uri: Option<&str>) -> Result<Url> {
    let raw = uri.map(str::trim).filter(|u| !u.is_empty());
    let Some(raw) = raw else {
        return Err(AppError::MissingVaultUri);
    };

    let invalid = |reason: &str| AppError::InvalidVaultUri {
        uri: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "https" {
        return Err(invalid("must begin with https://"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid("has no host")),
    }
}

/// Resolve the vault host once; failure is fatal
pub async fn resolve_vault_host(url: &Url) -> Result<Vec<SocketAddr>> {
    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port_or_known_default().unwrap_or(443);

    let resolution = |message: String| AppError::Resolution {
        host: host.clone(),
        message,
    };

    let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| resolution(e.to_string()))?
        .collect();

    if addresses.is_empty() {
        return Err(resolution("no addresses".to_string()));
    }

    tracing::debug!(host = %host, addresses = addresses.len(), "Resolved key vault host");
    Ok(addresses)
}

/// Validate and resolve the vault, then load it as configuration
pub async fn bootstrap(settings: &Settings) -> Result<Bootstrapped> {
    let url = validate_vault_uri(settings.vault.uri.as_deref())?;
    tracing::info!(vault = %url, "Using key vault as configuration provider");
    resolve_vault_host(&url).await?;

    let source = KeyVaultSecretSource::new(
        url,
        settings.vault.api_version.clone(),
        settings.vault.request_timeout(),
    )?;

    bootstrap_with(settings, Arc::new(source)).await
}

/// Load `source` over the environment and start refreshing it
pub async fn bootstrap_with(
    settings: &Settings,
    source: Arc<dyn SecretSource>,
) -> Result<Bootstrapped> {
    let config = Arc::new(ConfigStore::from_env());
    config.replace_secrets(source.load().await?).await;

    let refresh = settings
        .vault
        .refresh_interval()
        .map(|every| spawn_refresh(config.clone(), source, every));

    Ok(Bootstrapped { config, refresh })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_vault_uri() {
        assert!(matches!(validate_vault_uri(None), Err(AppError::MissingVaultUri)));
        assert!(matches!(validate_vault_uri(Some("  ")), Err(AppError::MissingVaultUri)));

        let err = validate_vault_uri(Some("http://example.com")).unwrap_err();
        assert!(matches!(err, AppError::InvalidVaultUri { .. }));
        assert!(err.is_configuration());

        assert!(validate_vault_uri(Some("weather-d-kv.vault.azure.net")).is_err());

        let url = validate_vault_uri(Some("https://weather-d-kv.vault.azure.net/")).unwrap();
        assert_eq!(url.host_str(), Some("weather-d-kv.vault.azure.net"));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_fatal() {
        let url = validate_vault_uri(Some("https://nonexistent.invalid")).unwrap();
        let err = resolve_vault_host(&url).await.unwrap_err();
        assert!(matches!(err, AppError::Resolution { ref host, .. } if host == "nonexistent.invalid"));
        assert!(!err.is_configuration());
    }
}

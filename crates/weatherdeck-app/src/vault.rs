//! Key Vault as a configuration source
//!
//! Secrets are read through the Key Vault REST API. Tokens come from the
//! app service managed identity when `IDENTITY_ENDPOINT` is set, otherwise
//! from a client secret in `AZURE_TENANT_ID`/`AZURE_CLIENT_ID`/
//! `AZURE_CLIENT_SECRET`.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const VAULT_RESOURCE: &str = "https://vault.azure.net";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const IDENTITY_API_VERSION: &str = "2019-08-01";
const TOKEN_ENDPOINT_TEMPLATE: &str =
    "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token";

/// Tokens are renewed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where configuration secrets come from
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// All enabled secrets, keyed by secret name
    async fn load(&self) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Clone)]
enum Credential {
    ManagedIdentity { endpoint: String, header: String },
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl Credential {
    fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let (Some(endpoint), Some(header)) = (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER"))
        {
            tracing::info!("Key vault credential: managed identity");
            return Ok(Credential::ManagedIdentity { endpoint, header });
        }

        match (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                tracing::info!(tenant_id = %tenant_id, "Key vault credential: client secret");
                Ok(Credential::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => Err(AppError::Credential(
                "set IDENTITY_ENDPOINT/IDENTITY_HEADER or AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET"
                    .to_string(),
            )),
        }
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Secret source backed by an Azure Key Vault
pub struct KeyVaultSecretSource {
    vault_uri: Url,
    api_version: String,
    client: Client,
    credential: Credential,
    token: Mutex<Option<CachedToken>>,
}

impl KeyVaultSecretSource {
    pub fn new(vault_uri: Url, api_version: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            vault_uri,
            api_version: api_version.into(),
            client,
            credential: Credential::from_env()?,
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut cache = self.token.lock().await;
        if let Some(cached) = cache.as_ref()
            && Instant::now() < cached.expires_at
        {
            return Ok(cached.token.clone());
        }

        let response = match &self.credential {
            Credential::ManagedIdentity { endpoint, header } => {
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&[
                        ("resource", VAULT_RESOURCE),
                        ("api-version", IDENTITY_API_VERSION),
                    ])
                    .send()
                    .await?
            }
            Credential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = TOKEN_ENDPOINT_TEMPLATE.replace("{tenant}", tenant_id);
                self.client
                    .post(url)
                    .form(&[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", VAULT_SCOPE),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await?
            }
        };

        let payload: TokenResponse = checked(response).await?.json().await?;
        let lifetime = Duration::from_secs(payload.lifetime_seconds())
            .saturating_sub(TOKEN_EXPIRY_MARGIN)
            .max(TOKEN_EXPIRY_MARGIN);

        *cache = Some(CachedToken {
            token: payload.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(payload.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.bearer_token().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Ok(checked(response).await?.json().await?)
    }

    fn secrets_url(&self) -> String {
        format!(
            "{}/secrets?api-version={}",
            self.vault_uri.as_str().trim_end_matches('/'),
            self.api_version
        )
    }
}

#[async_trait]
impl SecretSource for KeyVaultSecretSource {
    async fn load(&self) -> Result<HashMap<String, String>> {
        let mut secrets = HashMap::new();
        let mut next = Some(self.secrets_url());

        while let Some(url) = next {
            let page: SecretListResponse = self.get_json(&url).await?;

            for item in page.value {
                if !item.attributes.enabled {
                    continue;
                }
                let Some(name) = secret_name(&item.id) else {
                    continue;
                };
                let url = format!("{}?api-version={}", item.id, self.api_version);
                let bundle: SecretBundle = self.get_json(&url).await?;
                secrets.insert(name.to_string(), bundle.value);
            }

            next = page.next_link;
        }

        tracing::info!(
            vault = %self.vault_uri,
            secrets = secrets.len(),
            "Loaded key vault configuration"
        );
        Ok(secrets)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Vault { status, body })
}

/// Secret name from an id such as `https://v.vault.azure.net/secrets/Name`
fn secret_name(id: &str) -> Option<&str> {
    let (_, rest) = id.split_once("/secrets/")?;
    rest.split('/').next().filter(|name| !name.is_empty())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    /// Seconds until expiry; the identity endpoint sends strings
    fn lifetime_seconds(&self) -> u64 {
        match &self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(3600),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(3600),
            _ => 3600,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretListResponse {
    #[serde(default)]
    value: Vec<SecretItem>,
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

#[derive(Deserialize)]
struct SecretAttributes {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

impl Default for SecretAttributes {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

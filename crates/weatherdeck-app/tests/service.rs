use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;
use weatherdeck_app::settings::{Log, Server, Vault};
use weatherdeck_app::{
    AppError, AppState, ConfigStore, SecretSource, Settings, bootstrap, bootstrap_with, router,
};

/// In-memory vault whose contents tests change between refreshes
#[derive(Default)]
struct FakeVault {
    secrets: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl FakeVault {
    fn with_summary(summary: &str) -> Arc<Self> {
        let vault = Self::default();
        vault
            .secrets
            .try_lock()
            .unwrap()
            .insert("SecretForecast--Summary".to_string(), summary.to_string());
        Arc::new(vault)
    }

    async fn set_summary(&self, summary: &str) {
        self.secrets
            .lock()
            .await
            .insert("SecretForecast--Summary".to_string(), summary.to_string());
    }
}

#[async_trait]
impl SecretSource for FakeVault {
    async fn load(&self) -> weatherdeck_app::Result<HashMap<String, String>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Credential("vault unavailable".to_string()));
        }
        Ok(self.secrets.lock().await.clone())
    }
}

fn settings(uri: Option<&str>, refresh_interval_seconds: u64) -> Settings {
    Settings {
        server: Server {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        log: Log {
            level: "info".to_string(),
            format: "text".to_string(),
        },
        vault: Vault {
            uri: uri.map(str::to_string),
            refresh_interval_seconds,
            api_version: "7.4".to_string(),
            request_timeout_seconds: 5,
        },
    }
}

async fn get_json(config: Arc<ConfigStore>, uri: &str) -> (StatusCode, Value) {
    let response = router(AppState { config })
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn sentinel_summary(records: &Value) -> Value {
    records.as_array().unwrap().last().unwrap()["summary"].clone()
}

#[tokio::test]
async fn test_weatherforecast_returns_five_days_and_sentinel() {
    let ready = bootstrap_with(&settings(None, 0), FakeVault::with_summary("Secret"))
        .await
        .unwrap();
    assert!(ready.refresh.is_none());

    let (status, body) = get_json(ready.config, "/weatherforecast").await;
    assert_eq!(status, StatusCode::OK);

    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 6);
    for record in &records[..5] {
        let c = record["temperatureC"].as_i64().unwrap();
        assert!((-20..55).contains(&c));
        assert!(record["temperatureF"].is_i64());
        assert!(record["summary"].is_string());
        let date = record["date"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(date).is_ok(), "{date} has no offset");
    }

    let sentinel = &records[5];
    assert_eq!(sentinel["date"], "0001-01-01T00:00:00");
    assert_eq!(sentinel["temperatureC"], -99);
    assert_eq!(sentinel["summary"], "Secret");
}

#[tokio::test]
async fn test_sentinel_follows_refreshed_vault_values() {
    let vault = FakeVault::with_summary("first");
    let settings = settings(None, 1);
    let ready = bootstrap_with(&settings, vault.clone()).await.unwrap();
    let config = ready.config.clone();

    let (_, body) = get_json(config.clone(), "/weatherforecast").await;
    assert_eq!(sentinel_summary(&body), "first");

    vault.set_summary("second").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (_, body) = get_json(config.clone(), "/weatherforecast").await;
    assert_eq!(sentinel_summary(&body), "second");

    // a failed reload keeps what was loaded last
    vault.unavailable.store(true, Ordering::SeqCst);
    vault.set_summary("third").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let (_, body) = get_json(config, "/weatherforecast").await;
    assert_eq!(sentinel_summary(&body), "second");

    if let Some(refresh) = ready.refresh {
        refresh.abort();
    }
}

#[tokio::test]
async fn test_initial_vault_failure_is_fatal() {
    let vault = FakeVault::with_summary("unused");
    vault.unavailable.store(true, Ordering::SeqCst);

    let result = bootstrap_with(&settings(None, 0), vault).await;
    assert!(matches!(result, Err(AppError::Credential(_))));
}

#[tokio::test]
async fn test_healthz() {
    let config = Arc::new(ConfigStore::with_environment(Vec::new()));
    let (status, _) = get_json(config, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bootstrap_rejects_plain_http_vault() {
    let err = bootstrap(&settings(Some("http://example.com"), 0))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AppError::InvalidVaultUri { .. }));
}

#[tokio::test]
async fn test_bootstrap_requires_vault_uri() {
    let err = bootstrap(&settings(None, 0)).await.err().unwrap();
    assert!(matches!(err, AppError::MissingVaultUri));
}

#[tokio::test]
async fn test_bootstrap_fails_on_unknown_vault_host() {
    let err = bootstrap(&settings(Some("https://nonexistent.invalid"), 0))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AppError::Resolution { .. }));
}

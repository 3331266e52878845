//! Weather forecast service
//!
//! Serves `GET /weatherforecast` with configuration layered from the
//! environment and an Azure Key Vault.

pub mod bootstrap;
pub mod error;
pub mod forecast;
pub mod routes;
pub mod settings;
pub mod store;
pub mod vault;

pub use bootstrap::{Bootstrapped, bootstrap, bootstrap_with, resolve_vault_host, validate_vault_uri};
pub use error::{AppError, Result};
pub use forecast::{ForecastDate, WeatherForecast};
pub use routes::{AppState, router};
pub use settings::Settings;
pub use store::{ConfigProvider, ConfigStore};
pub use vault::{KeyVaultSecretSource, SecretSource};

//! az CLI wrapper
//!
//! Every call runs `az <args> --output json --only-show-errors` and parses
//! stdout as JSON. Arguments may carry secrets (passwords, secret values,
//! connection strings), so only the command path is logged.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// az CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct Az {
    subscription: Option<String>,
}

impl Az {
    pub fn new(subscription: Option<String>) -> Self {
        Self { subscription }
    }

    /// Check that az is installed and logged in
    pub async fn check_auth(&self) -> Result<AccountInfo> {
        let which = Command::new("which").arg("az").output().await?;
        if !which.status.success() {
            return Err(AzureError::AzNotFound);
        }

        match self.run_command(&["account", "show"]).await {
            Ok(output) => Ok(serde_json::from_str(&output)?),
            Err(AzureError::CommandFailed(message)) => Err(AzureError::NotLoggedIn(message)),
            Err(e) => Err(e),
        }
    }

    /// Run an az command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("az");
        cmd.args(args);
        cmd.args(["--output", "json", "--only-show-errors"]);
        if let Some(subscription) = &self.subscription
            && args.first() != Some(&"account")
        {
            cmd.arg("--subscription").arg(subscription);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: az {}", command_path(args));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an az command and parse its JSON output (`null` when empty)
    pub async fn json(&self, args: &[&str]) -> Result<Value> {
        let output = self.run_command(args).await?;
        if output.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Connection string of a storage account, for data-plane commands
    pub async fn storage_connection_string(
        &self,
        account: &str,
        resource_group: &str,
    ) -> Result<String> {
        let output = self
            .json(&[
                "storage",
                "account",
                "show-connection-string",
                "--name",
                account,
                "--resource-group",
                resource_group,
            ])
            .await?;
        string_field(&output, "connectionString")
    }

    /// Build `context` in the registry with ACR tasks
    pub async fn acr_build(&self, registry: &str, image: &str, context: &Path) -> Result<Value> {
        let context = context.display().to_string();
        self.json(&[
            "acr", "build", "--registry", registry, "--image", image, "--no-logs", &context,
        ])
        .await
    }

    /// Delete an ARM resource by id
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.run_command(&["resource", "delete", "--ids", id]).await?;
        Ok(())
    }
}

/// Subcommand words before the first flag; flag values may be secret
fn command_path(args: &[&str]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with("--"))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read a string field from az JSON output
pub fn string_field(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AzureError::UnexpectedOutput(format!("missing '{}'", key)))
}

/// Read a string at a JSON pointer, e.g. `/properties/vaultUri`
pub fn string_at(value: &Value, pointer: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AzureError::UnexpectedOutput(format!("missing '{}'", pointer)))
}

/// Account information from `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: String,
}

impl AccountInfo {
    pub fn describe(&self) -> String {
        match &self.user {
            Some(user) => format!("{} on {} ({})", user.name, self.name, self.id),
            None => format!("{} ({})", self.name, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_path_hides_flag_values() {
        let args = [
            "keyvault", "secret", "set", "--vault-name", "demo-kv", "--value", "hunter2",
        ];
        assert_eq!(command_path(&args), "keyvault secret set");
    }

    #[test]
    fn test_field_helpers() {
        let vault = json!({
            "id": "/subscriptions/x/resourceGroups/demo-rg/providers/Microsoft.KeyVault/vaults/demo-kv",
            "properties": {"vaultUri": "https://demo-kv.vault.azure.net/"}
        });
        assert_eq!(
            string_at(&vault, "/properties/vaultUri").unwrap(),
            "https://demo-kv.vault.azure.net/"
        );
        assert!(string_field(&vault, "id").unwrap().ends_with("demo-kv"));
        assert!(matches!(
            string_field(&vault, "name"),
            Err(AzureError::UnexpectedOutput(_))
        ));
    }

    #[test]
    fn test_parse_account() {
        let account: AccountInfo = serde_json::from_value(json!({
            "id": "0000-sub",
            "name": "Pay-As-You-Go",
            "tenantId": "tenant",
            "user": {"name": "alice@example.com", "type": "user"}
        }))
        .unwrap();
        assert_eq!(
            account.describe(),
            "alice@example.com on Pay-As-You-Go (0000-sub)"
        );
    }
}

//! Key vault, access policies and secrets
//!
//! Secrets depend explicitly on every access policy of the vault. Nothing in
//! a secret's inputs points at a policy, so the edge cannot be inferred.

use super::base::Core;
use super::sql::Sql;
use super::types;
use super::web::App;
use crate::error::Result;
use crate::model::StackSettings;
use crate::naming::Names;
use serde_json::json;
use weatherdeck_cloud::{Input, OutputRef, ResourceDecl, ResourceGraph, ResourceId};

/// Object id used for the app's policy until the app's managed identity is
/// known
pub const PLACEHOLDER_PRINCIPAL_ID: &str = "00000000-0000-0000-0000-000000000000";

const OPERATOR_SECRET_PERMISSIONS: [&str; 8] = [
    "get", "list", "set", "delete", "purge", "recover", "backup", "restore",
];
const APP_SECRET_PERMISSIONS: [&str; 2] = ["get", "list"];

/// Secret read by the app as `SecretForecast:Summary`
pub const SUMMARY_SECRET: &str = "SecretForecast--Summary";
pub const STORAGE_SECRET: &str = "StorageConnectionString";
pub const SQL_SECRET: &str = "ConnectionStrings--Sql";

pub(super) struct Vault {
    pub vault: ResourceId,
}

impl Vault {
    pub fn name(&self) -> OutputRef {
        OutputRef::new(self.vault.clone(), "name")
    }

    pub fn uri(&self) -> OutputRef {
        OutputRef::new(self.vault.clone(), "vault_uri")
    }
}

pub(super) fn declare_vault(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
    core: &Core,
) -> Result<Vault> {
    let kv = ResourceDecl::new(types::KEY_VAULT, names.logical("kv"))
        .input("name", names.key_vault()?)
        .input("resource_group", core.resource_group_name())
        .input("location", core.location.as_str())
        .input("tenant_id", settings.tenant_id.clone().unwrap_or_default())
        .input("sku", "standard");

    Ok(Vault {
        vault: graph.add(kv)?,
    })
}

/// Access policies for every operator and for the app, then the secrets
pub(super) fn declare_access(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
    core: &Core,
    vault: &Vault,
    app: &App,
    sql: Option<&Sql>,
) -> Result<()> {
    let tenant_id = settings.tenant_id.clone().unwrap_or_default();
    let mut policies = Vec::with_capacity(settings.operators.len() + 1);

    for operator in &settings.operators {
        let mut policy = ResourceDecl::new(
            types::KEY_VAULT_ACCESS_POLICY,
            names.logical(&format!("policy-{}", operator.name)),
        )
        .input("vault_name", vault.name())
        .input("tenant_id", tenant_id.as_str())
        .input("object_id", operator.object_id.as_str())
        .input("secret_permissions", json!(OPERATOR_SECRET_PERMISSIONS));
        if let Some(application_id) = &operator.application_id {
            policy = policy.input("application_id", application_id.as_str());
        }
        policies.push(graph.add(policy)?);
    }

    let app_policy = ResourceDecl::new(types::KEY_VAULT_ACCESS_POLICY, names.logical("policy-app"))
        .input("vault_name", vault.name())
        .input("tenant_id", tenant_id.as_str())
        .input(
            "object_id",
            app.principal_id().or_fallback(PLACEHOLDER_PRINCIPAL_ID),
        )
        .input("secret_permissions", json!(APP_SECRET_PERMISSIONS));
    policies.push(graph.add(app_policy)?);

    let mut secrets = vec![
        (
            "secret-summary",
            SUMMARY_SECRET,
            Input::from(settings.secret_summary.as_str()),
        ),
        (
            "secret-storage",
            STORAGE_SECRET,
            Input::from(core.storage_connection_string()),
        ),
    ];
    if let Some(sql) = sql {
        secrets.push(("secret-sql", SQL_SECRET, sql.connection_string.clone()));
    }

    for (logical, name, value) in secrets {
        let secret = ResourceDecl::new(types::KEY_VAULT_SECRET, names.logical(logical))
            .input("vault_name", vault.name())
            .input("name", name)
            .input("value", Input::secret(value))
            .depends_on_all(policies.iter().cloned());
        graph.add(secret)?;
    }

    Ok(())
}

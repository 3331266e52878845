//! Resource topology of a stack
//!
//! [`render`] turns [`StackSettings`] into a [`ResourceGraph`]. All variants
//! share the same core (resource group, storage, table, app insights) and
//! add their own hosting resources on top:
//!
//! | variant         | hosting                               | extras            |
//! |-----------------|---------------------------------------|-------------------|
//! | `package`       | Windows plan, zip package in blob     |                   |
//! | `vault`         | Windows plan, zip package in blob     | key vault         |
//! | `container`     | Linux plan, registry + built image    | key vault         |
//! | `container-sql` | Linux plan, registry + built image    | key vault, SQL db |
//!
//! Every value produced by one resource and consumed by another goes through
//! an [`OutputRef`](weatherdeck_cloud::OutputRef), which is what orders the
//! graph.

mod base;
mod package;
mod registry;
mod sql;
mod vault;
mod web;

use crate::error::Result;
use crate::freeze::{RenderContext, check_freeze};
use crate::model::StackSettings;
use crate::naming::Names;
use weatherdeck_cloud::{Fragment, Input, ResourceGraph};

pub use vault::{PLACEHOLDER_PRINCIPAL_ID, SQL_SECRET, STORAGE_SECRET, SUMMARY_SECRET};

/// Resource types understood by the Azure provider
pub mod types {
    pub const RESOURCE_GROUP: &str = "resource-group";
    pub const STORAGE_ACCOUNT: &str = "storage-account";
    pub const STORAGE_CONTAINER: &str = "storage-container";
    pub const STORAGE_BLOB: &str = "storage-blob";
    pub const STORAGE_TABLE: &str = "storage-table";
    pub const APP_SERVICE_PLAN: &str = "app-service-plan";
    pub const APP_SERVICE: &str = "app-service";
    pub const APP_INSIGHTS: &str = "app-insights";
    pub const CONTAINER_REGISTRY: &str = "container-registry";
    pub const CONTAINER_IMAGE: &str = "container-image";
    pub const KEY_VAULT: &str = "key-vault";
    pub const KEY_VAULT_ACCESS_POLICY: &str = "key-vault-access-policy";
    pub const KEY_VAULT_SECRET: &str = "key-vault-secret";
    pub const SQL_SERVER: &str = "sql-server";
    pub const SQL_DATABASE: &str = "sql-database";
}

/// Stack output names
pub mod outputs {
    pub const ENDPOINT: &str = "endpoint";
    pub const RESOURCE_GROUP_NAME: &str = "resource_group_name";
    pub const APP_NAME: &str = "app_name";
    pub const VAULT_URI: &str = "vault_uri";
    pub const REGISTRY_NAME: &str = "registry_name";
}

/// Render the resource graph of a stack
///
/// Settings are validated and the freeze gate checked before any resource
/// is declared.
pub fn render(settings: &StackSettings, ctx: &RenderContext) -> Result<ResourceGraph> {
    settings.validate()?;
    check_freeze(settings.variant, ctx)?;

    let names = Names::for_stack(&settings.name)?;
    let variant = settings.variant;
    let mut graph = ResourceGraph::new();

    let core = base::declare(&mut graph, settings, &names)?;
    let mut spec = web::AppSpec::new(&core);

    if variant.uses_container() {
        let registry = registry::declare(&mut graph, settings, &names, &core)?;
        spec.run_image(&registry);
        graph.export(outputs::REGISTRY_NAME, registry.name());
    } else {
        let package = package::declare(&mut graph, settings, &names, &core)?;
        spec.run_package(&package);
    }

    let sql = if variant.uses_sql() {
        let sql = sql::declare(&mut graph, settings, &names, &core)?;
        spec.connection_string("sql", "SQLAzure", Input::secret(sql.connection_string.clone()));
        Some(sql)
    } else {
        None
    };

    let vault = if variant.uses_vault() {
        let vault = vault::declare_vault(&mut graph, settings, &names, &core)?;
        spec.use_vault(&vault, &core);
        Some(vault)
    } else {
        spec.connection_string(
            "storage",
            "Custom",
            Input::secret(core.storage_connection_string()),
        );
        None
    };

    let app = web::declare(&mut graph, &names, &core, spec)?;

    if let Some(vault) = &vault {
        vault::declare_access(&mut graph, settings, &names, &core, vault, &app, sql.as_ref())?;
        graph.export(outputs::VAULT_URI, vault.uri());
    }

    graph.export(
        outputs::ENDPOINT,
        Input::interpolate([Fragment::from("https://"), Fragment::from(app.hostname())]),
    );
    graph.export(outputs::RESOURCE_GROUP_NAME, core.resource_group_name());
    graph.export(outputs::APP_NAME, app.name());

    graph.validate()?;
    tracing::debug!(
        stack = %settings.name,
        variant = %variant,
        resources = graph.len(),
        "Rendered topology"
    );
    Ok(graph)
}

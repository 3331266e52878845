//! Azure provider implementation
//!
//! Maps each resource type to az commands and turns their JSON output into
//! the output attributes other resources reference.

use crate::az::{Az, string_at, string_field};
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use weatherdeck_cloud::{AuthStatus, CloudProvider, ResourceConfig, ResourceOutputs, ResourceState};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Resource types this provider knows how to manage
pub const SUPPORTED_TYPES: [&str; 15] = [
    "resource-group",
    "storage-account",
    "storage-container",
    "storage-blob",
    "storage-table",
    "app-service-plan",
    "app-service",
    "app-insights",
    "container-registry",
    "container-image",
    "key-vault",
    "key-vault-access-policy",
    "key-vault-secret",
    "sql-server",
    "sql-database",
];

/// Lifetime of the read SAS handed to the app service
const SAS_VALIDITY_DAYS: i64 = 3650;

/// Firewall rule name Azure uses for "allow Azure services"
const AZURE_SERVICES_RULE: &str = "AllowAllWindowsAzureIps";

/// Azure provider
pub struct AzureProvider {
    az: Az,
}

impl AzureProvider {
    pub fn new(subscription: Option<String>) -> Self {
        Self {
            az: Az::new(subscription),
        }
    }

    pub fn supports(resource_type: &str) -> bool {
        SUPPORTED_TYPES.contains(&resource_type)
    }

    async fn apply(
        &self,
        resource: &ResourceConfig,
        current: Option<&ResourceState>,
    ) -> Result<ResourceOutputs> {
        match resource.resource_type.as_str() {
            "resource-group" => self.resource_group(resource).await,
            "storage-account" => self.storage_account(resource).await,
            "storage-container" => self.storage_container(resource).await,
            "storage-blob" => self.storage_blob(resource).await,
            "storage-table" => self.storage_table(resource).await,
            "app-service-plan" => self.app_service_plan(resource).await,
            "app-service" => self.app_service(resource).await,
            "app-insights" => self.app_insights(resource).await,
            "container-registry" => self.container_registry(resource).await,
            "container-image" => self.container_image(resource).await,
            "key-vault" => self.key_vault(resource).await,
            "key-vault-access-policy" => self.access_policy(resource, current).await,
            "key-vault-secret" => self.secret(resource).await,
            "sql-server" => self.sql_server(resource).await,
            "sql-database" => self.sql_database(resource).await,
            other => Err(AzureError::UnsupportedResource(other.to_string())),
        }
    }

    // ========== Resource group ==========

    async fn resource_group(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let location = input(r, "location")?;

        let group = self
            .az
            .json(&["group", "create", "--name", name, "--location", location])
            .await?;

        Ok(outputs([
            ("id", json!(string_field(&group, "id")?)),
            ("name", json!(name)),
            ("location", json!(location)),
        ]))
    }

    // ========== Storage ==========

    async fn storage_account(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let resource_group = input(r, "resource_group")?;

        let account = self
            .az
            .json(&[
                "storage",
                "account",
                "create",
                "--name",
                name,
                "--resource-group",
                resource_group,
                "--location",
                input(r, "location")?,
                "--kind",
                input(r, "kind")?,
                "--sku",
                input(r, "sku")?,
                "--https-only",
                "true",
                "--min-tls-version",
                "TLS1_2",
            ])
            .await?;
        let connection_string = self
            .az
            .storage_connection_string(name, resource_group)
            .await?;

        Ok(outputs([
            ("id", json!(string_field(&account, "id")?)),
            ("name", json!(name)),
            ("resource_group", json!(resource_group)),
            (
                "primary_blob_endpoint",
                json!(string_at(&account, "/primaryEndpoints/blob").ok()),
            ),
            ("primary_connection_string", json!(connection_string)),
        ]))
    }

    async fn storage_container(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let account = input(r, "account_name")?;
        let resource_group = input(r, "resource_group")?;
        let access = r.get_str("public_access").unwrap_or("off");
        let connection_string = self
            .az
            .storage_connection_string(account, resource_group)
            .await?;

        self.az
            .json(&[
                "storage",
                "container",
                "create",
                "--name",
                name,
                "--public-access",
                access,
                "--connection-string",
                &connection_string,
            ])
            .await?;

        Ok(data_plane_outputs(account, resource_group, name))
    }

    async fn storage_table(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let account = input(r, "account_name")?;
        let resource_group = input(r, "resource_group")?;
        let connection_string = self
            .az
            .storage_connection_string(account, resource_group)
            .await?;

        self.az
            .json(&[
                "storage",
                "table",
                "create",
                "--name",
                name,
                "--connection-string",
                &connection_string,
            ])
            .await?;

        Ok(data_plane_outputs(account, resource_group, name))
    }

    async fn storage_blob(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let container = input(r, "container_name")?;
        let account = input(r, "account_name")?;
        let resource_group = input(r, "resource_group")?;
        let blob_type = r.get_str("blob_type").unwrap_or("block");
        let source = archive_path(r, "source")?;

        let connection_string = self
            .az
            .storage_connection_string(account, resource_group)
            .await?;

        let staging = tempfile::tempdir()?;
        let file = package_source(&source, staging.path()).await?;
        let file = file.display().to_string();
        tracing::info!(blob = name, source = %source.display(), "Uploading package");

        self.az
            .json(&[
                "storage",
                "blob",
                "upload",
                "--container-name",
                container,
                "--name",
                name,
                "--file",
                &file,
                "--type",
                blob_type,
                "--overwrite",
                "true",
                "--connection-string",
                &connection_string,
            ])
            .await?;

        let url = self
            .az
            .json(&[
                "storage",
                "blob",
                "url",
                "--container-name",
                container,
                "--name",
                name,
                "--connection-string",
                &connection_string,
            ])
            .await?;

        let expiry = (Utc::now() + Duration::days(SAS_VALIDITY_DAYS))
            .format("%Y-%m-%dT%H:%MZ")
            .to_string();
        let signed_url = self
            .az
            .json(&[
                "storage",
                "blob",
                "generate-sas",
                "--container-name",
                container,
                "--name",
                name,
                "--permissions",
                "r",
                "--expiry",
                &expiry,
                "--https-only",
                "--full-uri",
                "--connection-string",
                &connection_string,
            ])
            .await?;

        let mut result = data_plane_outputs(account, resource_group, name);
        result.insert("id".to_string(), url.clone());
        result.insert("container_name".to_string(), json!(container));
        result.insert("url".to_string(), url);
        result.insert("signed_url".to_string(), signed_url);
        Ok(result)
    }

    // ========== Web ==========

    async fn app_insights(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;

        let component = self
            .az
            .json(&[
                "monitor",
                "app-insights",
                "component",
                "create",
                "--app",
                name,
                "--resource-group",
                input(r, "resource_group")?,
                "--location",
                input(r, "location")?,
                "--kind",
                input(r, "kind")?,
                "--application-type",
                input(r, "application_type")?,
            ])
            .await?;

        Ok(outputs([
            ("id", json!(string_field(&component, "id")?)),
            ("name", json!(name)),
            (
                "instrumentation_key",
                json!(string_field(&component, "instrumentationKey")?),
            ),
            (
                "connection_string",
                json!(string_field(&component, "connectionString").ok()),
            ),
        ]))
    }

    async fn app_service_plan(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let mut args = vec![
            "appservice",
            "plan",
            "create",
            "--name",
            name,
            "--resource-group",
            input(r, "resource_group")?,
            "--location",
            input(r, "location")?,
            "--sku",
            input(r, "sku")?,
        ];
        if flag(r, "linux") {
            args.push("--is-linux");
        }

        let plan = self.az.json(&args).await?;

        Ok(outputs([
            ("id", json!(string_field(&plan, "id")?)),
            ("name", json!(name)),
        ]))
    }

    async fn app_service(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let resource_group = input(r, "resource_group")?;
        let container = r.config.get("container");
        let image = container.map(|c| field(r, c, "image")).transpose()?;

        let mut args = vec![
            "webapp",
            "create",
            "--name",
            name,
            "--resource-group",
            resource_group,
            "--plan",
            input(r, "plan")?,
        ];
        if let Some(image) = image {
            args.extend(["--deployment-container-image-name", image]);
        }
        let site = self.az.json(&args).await?;
        let target = ["--name", name, "--resource-group", resource_group];

        if flag(r, "https_only") {
            self.az
                .json(&[&["webapp", "update"][..], &target, &["--https-only", "true"]].concat())
                .await?;
        }

        let principal_id = if flag(r, "identity") {
            let identity = self
                .az
                .json(&[&["webapp", "identity", "assign"][..], &target].concat())
                .await?;
            Some(string_field(&identity, "principalId")?)
        } else {
            None
        };

        let settings = key_value_args(r.config.get("app_settings"))?;
        if !settings.is_empty() {
            let mut args = [&["webapp", "config", "appsettings", "set"][..], &target, &["--settings"]].concat();
            args.extend(settings.iter().map(String::as_str));
            self.az.json(&args).await?;
        }

        for (kind, pairs) in connection_string_groups(r.config.get("connection_strings"))? {
            let mut args = [
                &["webapp", "config", "connection-string", "set"][..],
                &target,
                &["--connection-string-type", kind.as_str(), "--settings"],
            ]
            .concat();
            args.extend(pairs.iter().map(String::as_str));
            self.az.json(&args).await?;
        }

        if let (Some(container), Some(image)) = (container, image) {
            let mut args = [
                &["webapp", "config", "container", "set"][..],
                &target,
                &["--container-image-name", image],
            ]
            .concat();
            for (key, flag_name) in [
                ("registry_url", "--container-registry-url"),
                ("username", "--container-registry-user"),
                ("password", "--container-registry-password"),
            ] {
                args.extend([flag_name, field(r, container, key)?]);
            }
            self.az.json(&args).await?;
        }

        Ok(outputs([
            ("id", json!(string_field(&site, "id")?)),
            ("name", json!(name)),
            ("resource_group", json!(resource_group)),
            (
                "default_site_hostname",
                json!(string_field(&site, "defaultHostName")?),
            ),
            ("principal_id", json!(principal_id)),
        ]))
    }

    // ========== Registry ==========

    async fn container_registry(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let admin = flag(r, "admin_enabled");

        let registry = self
            .az
            .json(&[
                "acr",
                "create",
                "--name",
                name,
                "--resource-group",
                input(r, "resource_group")?,
                "--location",
                input(r, "location")?,
                "--sku",
                input(r, "sku")?,
                "--admin-enabled",
                if admin { "true" } else { "false" },
            ])
            .await?;

        let mut result = outputs([
            ("id", json!(string_field(&registry, "id")?)),
            ("name", json!(name)),
            ("login_server", json!(string_field(&registry, "loginServer")?)),
        ]);

        if admin {
            let credentials = self
                .az
                .json(&["acr", "credential", "show", "--name", name])
                .await?;
            result.insert(
                "admin_username".to_string(),
                json!(string_field(&credentials, "username")?),
            );
            result.insert(
                "admin_password".to_string(),
                json!(string_at(&credentials, "/passwords/0/value")?),
            );
        }

        Ok(result)
    }

    async fn container_image(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let registry = input(r, "registry")?;
        let login_server = input(r, "login_server")?;
        let repository = input(r, "repository")?;
        let tag = input(r, "tag")?;
        let context = archive_path(r, "context")?;
        let image = format!("{}:{}", repository, tag);

        tracing::info!(registry, image = %image, "Building image");
        let run = self.az.acr_build(registry, &image, &context).await?;
        let image_name = format!("{}/{}", login_server, image);
        let digest = string_at(&run, "/outputImages/0/digest").ok();

        // pins the app service to this build; a rebuilt tag gets a new digest
        let image_ref = match &digest {
            Some(digest) => format!("{}/{}@{}", login_server, repository, digest),
            None => image_name.clone(),
        };

        Ok(outputs([
            ("id", json!(image_name)),
            ("image_name", json!(image_name)),
            ("image_ref", json!(image_ref)),
            ("registry", json!(registry)),
            ("repository", json!(repository)),
            ("tag", json!(tag)),
            ("digest", json!(digest)),
            ("run_id", json!(string_field(&run, "runId").ok())),
        ]))
    }

    // ========== Key vault ==========

    async fn key_vault(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let resource_group = input(r, "resource_group")?;
        let tenant_id = input(r, "tenant_id")?;

        // `keyvault create` on an existing vault resets its access policies
        let vault = match self.az.json(&["keyvault", "show", "--name", name]).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                self.az
                    .json(&[
                        "keyvault",
                        "create",
                        "--name",
                        name,
                        "--resource-group",
                        resource_group,
                        "--location",
                        input(r, "location")?,
                        "--sku",
                        input(r, "sku")?,
                        "--enable-rbac-authorization",
                        "false",
                    ])
                    .await?
            }
            Err(e) => return Err(e),
        };

        let actual_tenant = string_at(&vault, "/properties/tenantId")?;
        if !tenant_id.is_empty() && actual_tenant != tenant_id {
            return Err(AzureError::TenantMismatch {
                vault: name.to_string(),
                expected: tenant_id.to_string(),
                actual: actual_tenant,
            });
        }

        Ok(outputs([
            ("id", json!(string_field(&vault, "id")?)),
            ("name", json!(name)),
            ("resource_group", json!(resource_group)),
            ("vault_uri", json!(string_at(&vault, "/properties/vaultUri")?)),
            ("tenant_id", json!(actual_tenant)),
        ]))
    }

    async fn access_policy(
        &self,
        r: &ResourceConfig,
        current: Option<&ResourceState>,
    ) -> Result<ResourceOutputs> {
        let vault = input(r, "vault_name")?;
        let object_id = input(r, "object_id")?;
        let application_id = r.get_str("application_id");
        let permissions: Vec<String> = r.get_config("secret_permissions").unwrap_or_default();

        // a changed identity must not keep the old grant
        if let Some(current) = current
            && let Some(previous) = current.get_attribute::<String>("object_id")
            && previous != object_id
        {
            self.delete_policy(current).await?;
        }

        let mut args = vec![
            "keyvault",
            "set-policy",
            "--name",
            vault,
            "--object-id",
            object_id,
        ];
        if let Some(application_id) = application_id {
            args.extend(["--application-id", application_id]);
        }
        if !permissions.is_empty() {
            args.push("--secret-permissions");
            args.extend(permissions.iter().map(String::as_str));
        }
        self.az.json(&args).await?;

        Ok(outputs([
            ("id", json!(format!("{}/{}", vault, object_id))),
            ("vault_name", json!(vault)),
            ("object_id", json!(object_id)),
            ("application_id", json!(application_id)),
        ]))
    }

    async fn secret(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let vault = input(r, "vault_name")?;
        let name = input(r, "name")?;
        let value = match r.config.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => {
                return Err(AzureError::MissingInput {
                    resource: r.id.clone(),
                    key: "value".to_string(),
                });
            }
        };

        let secret = self
            .az
            .json(&[
                "keyvault",
                "secret",
                "set",
                "--vault-name",
                vault,
                "--name",
                name,
                "--value",
                &value,
            ])
            .await?;

        // the response echoes the value; only identifiers are kept
        Ok(outputs([
            ("id", json!(string_field(&secret, "id")?)),
            ("name", json!(name)),
            ("vault_name", json!(vault)),
        ]))
    }

    // ========== SQL ==========

    async fn sql_server(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let resource_group = input(r, "resource_group")?;
        let password = input(r, "admin_password")?;
        let target = ["--name", name, "--resource-group", resource_group];

        let server = match self
            .az
            .json(&[&["sql", "server", "show"][..], &target].concat())
            .await
        {
            Ok(_) => {
                self.az
                    .json(&[&["sql", "server", "update"][..], &target, &["--admin-password", password]].concat())
                    .await?
            }
            Err(e) if e.is_not_found() => {
                self.az
                    .json(
                        &[
                            &["sql", "server", "create"][..],
                            &target,
                            &[
                                "--location",
                                input(r, "location")?,
                                "--admin-user",
                                input(r, "admin_login")?,
                                "--admin-password",
                                password,
                            ],
                        ]
                        .concat(),
                    )
                    .await?
            }
            Err(e) => return Err(e),
        };

        if flag(r, "allow_azure_services") {
            self.az
                .json(&[
                    "sql",
                    "server",
                    "firewall-rule",
                    "create",
                    "--resource-group",
                    resource_group,
                    "--server",
                    name,
                    "--name",
                    AZURE_SERVICES_RULE,
                    "--start-ip-address",
                    "0.0.0.0",
                    "--end-ip-address",
                    "0.0.0.0",
                ])
                .await?;
        }

        Ok(outputs([
            ("id", json!(string_field(&server, "id")?)),
            ("name", json!(name)),
            ("resource_group", json!(resource_group)),
            ("fqdn", json!(string_field(&server, "fullyQualifiedDomainName")?)),
        ]))
    }

    async fn sql_database(&self, r: &ResourceConfig) -> Result<ResourceOutputs> {
        let name = input(r, "name")?;
        let server = input(r, "server_name")?;
        let resource_group = input(r, "resource_group")?;

        let database = self
            .az
            .json(&[
                "sql",
                "db",
                "create",
                "--resource-group",
                resource_group,
                "--server",
                server,
                "--name",
                name,
                "--service-objective",
                input(r, "service_objective")?,
            ])
            .await?;

        Ok(outputs([
            ("id", json!(string_field(&database, "id")?)),
            ("name", json!(name)),
            ("server_name", json!(server)),
            ("resource_group", json!(resource_group)),
        ]))
    }

    // ========== Deletion ==========

    async fn remove(&self, logical_name: &str, current: &ResourceState) -> Result<()> {
        let attr = |key: &str| attribute(logical_name, current, key);

        match current.resource_type.as_str() {
            "resource-group" => {
                let name = attr("name")?;
                self.az
                    .run_command(&["group", "delete", "--name", &name, "--yes"])
                    .await?;
            }
            "storage-container" | "storage-table" | "storage-blob" => {
                let name = attr("name")?;
                let connection_string = self
                    .az
                    .storage_connection_string(&attr("account_name")?, &attr("resource_group")?)
                    .await?;
                let mut args = match current.resource_type.as_str() {
                    "storage-container" => vec!["storage", "container", "delete"],
                    "storage-table" => vec!["storage", "table", "delete"],
                    _ => vec!["storage", "blob", "delete"],
                };
                let container = attr("container_name");
                if let Ok(container) = &container {
                    args.extend(["--container-name", container.as_str()]);
                }
                args.extend([
                    "--name",
                    name.as_str(),
                    "--connection-string",
                    connection_string.as_str(),
                ]);
                self.az.run_command(&args).await?;
            }
            "key-vault" => {
                let name = attr("name")?;
                self.az
                    .run_command(&["keyvault", "delete", "--name", &name])
                    .await?;
                if let Err(e) = self
                    .az
                    .run_command(&["keyvault", "purge", "--name", &name])
                    .await
                {
                    tracing::warn!(vault = %name, error = %e, "Vault deleted but not purged");
                }
            }
            "key-vault-access-policy" => self.delete_policy(current).await?,
            "key-vault-secret" => {
                let vault = attr("vault_name")?;
                let name = attr("name")?;
                let target = ["--vault-name", vault.as_str(), "--name", name.as_str()];
                self.az
                    .run_command(&[&["keyvault", "secret", "delete"][..], &target].concat())
                    .await?;
                if let Err(e) = self
                    .az
                    .run_command(&[&["keyvault", "secret", "purge"][..], &target].concat())
                    .await
                {
                    tracing::warn!(secret = %name, error = %e, "Secret deleted but not purged");
                }
            }
            "container-image" => {
                let image = format!("{}:{}", attr("repository")?, attr("tag")?);
                self.az
                    .run_command(&[
                        "acr",
                        "repository",
                        "delete",
                        "--name",
                        &attr("registry")?,
                        "--image",
                        &image,
                        "--yes",
                    ])
                    .await?;
            }
            "storage-account" | "app-service-plan" | "app-service" | "app-insights"
            | "container-registry" | "sql-server" | "sql-database" => {
                self.az.delete_by_id(&current.id).await?;
            }
            other => return Err(AzureError::UnsupportedResource(other.to_string())),
        }

        Ok(())
    }

    async fn delete_policy(&self, current: &ResourceState) -> Result<()> {
        let vault = attribute(&current.id, current, "vault_name")?;
        let object_id = attribute(&current.id, current, "object_id")?;
        let application_id = current.get_attribute::<String>("application_id");

        let mut args = vec![
            "keyvault",
            "delete-policy",
            "--name",
            vault.as_str(),
            "--object-id",
            object_id.as_str(),
        ];
        if let Some(application_id) = &application_id {
            args.extend(["--application-id", application_id.as_str()]);
        }
        match self.az.run_command(&args).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    fn display_name(&self) -> &str {
        "Microsoft Azure"
    }

    async fn check_auth(&self) -> weatherdeck_cloud::Result<AuthStatus> {
        match self.az.check_auth().await {
            Ok(account) => Ok(AuthStatus::ok(account.describe())),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn create(&self, resource: &ResourceConfig) -> weatherdeck_cloud::Result<ResourceOutputs> {
        Ok(self.apply(resource, None).await?)
    }

    async fn update(
        &self,
        resource: &ResourceConfig,
        current: &ResourceState,
    ) -> weatherdeck_cloud::Result<ResourceOutputs> {
        Ok(self.apply(resource, Some(current)).await?)
    }

    async fn delete(&self, logical_name: &str, current: &ResourceState) -> weatherdeck_cloud::Result<()> {
        match self.remove(logical_name, current).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!(resource = logical_name, "Already gone");
                Ok(())
            }
            other => Ok(other?),
        }
    }
}

fn input<'a>(r: &'a ResourceConfig, key: &str) -> Result<&'a str> {
    r.get_str(key).ok_or_else(|| AzureError::MissingInput {
        resource: r.id.clone(),
        key: key.to_string(),
    })
}

fn field<'a>(r: &ResourceConfig, value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AzureError::MissingInput {
            resource: r.id.clone(),
            key: key.to_string(),
        })
}

fn flag(r: &ResourceConfig, key: &str) -> bool {
    r.get_config::<bool>(key).unwrap_or(false)
}

fn attribute(logical_name: &str, current: &ResourceState, key: &str) -> Result<String> {
    current
        .get_attribute::<String>(key)
        .ok_or_else(|| AzureError::MissingInput {
            resource: logical_name.to_string(),
            key: key.to_string(),
        })
}

fn outputs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> ResourceOutputs {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn data_plane_outputs(account: &str, resource_group: &str, name: &str) -> ResourceOutputs {
    outputs([
        ("id", json!(format!("{}/{}", account, name))),
        ("name", json!(name)),
        ("account_name", json!(account)),
        ("resource_group", json!(resource_group)),
    ])
}

/// `KEY=VALUE` arguments from a map of settings
fn key_value_args(map: Option<&Value>) -> Result<Vec<String>> {
    let Some(map) = map.filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };
    let object = map
        .as_object()
        .ok_or_else(|| AzureError::UnexpectedOutput("settings must be a map".to_string()))?;

    Ok(object
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect())
}

/// Connection strings grouped by type, as `NAME=VALUE` arguments
fn connection_string_groups(map: Option<&Value>) -> Result<BTreeMap<String, Vec<String>>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let Some(object) = map.and_then(Value::as_object) else {
        return Ok(groups);
    };

    for (name, entry) in object {
        let value = entry.get("value").and_then(Value::as_str).ok_or_else(|| {
            AzureError::UnexpectedOutput(format!("connection string '{}' has no value", name))
        })?;
        let kind = entry.get("type").and_then(Value::as_str).unwrap_or("Custom");
        groups
            .entry(kind.to_string())
            .or_default()
            .push(format!("{}={}", name, value));
    }

    Ok(groups)
}

/// Local path of an archive input, `{"path", "sha256"}` or a plain path
fn archive_path(r: &ResourceConfig, key: &str) -> Result<PathBuf> {
    let value = r.config.get(key);
    value
        .and_then(|v| v.get("path").or(Some(v)))
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| AzureError::MissingInput {
            resource: r.id.clone(),
            key: key.to_string(),
        })
}

/// Zip file to upload for `source`: zip files as-is, directories packed
/// into `staging/package.zip`
async fn package_source(source: &Path, staging: &Path) -> Result<PathBuf> {
    let packaging = |message: String| AzureError::Packaging {
        path: source.display().to_string(),
        message,
    };

    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| packaging(e.to_string()))?;

    if metadata.is_file() {
        return Ok(source.to_path_buf());
    }

    let archive = staging.join("package.zip");
    let (from, to) = (source.to_path_buf(), archive.clone());
    tokio::task::spawn_blocking(move || zip_directory(&from, &to))
        .await
        .map_err(|e| packaging(e.to_string()))?
        .map_err(packaging)?;

    Ok(archive)
}

fn zip_directory(source: &Path, archive: &Path) -> std::result::Result<usize, String> {
    let files = weatherdeck_cloud::archive::archive_files(source).map_err(|e| e.to_string())?;
    let file = std::fs::File::create(archive).map_err(|e| e.to_string())?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, path) in &files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| format!("{}: {}", name, e))?;
        let mut input = std::fs::File::open(path).map_err(|e| format!("{}: {}", name, e))?;
        std::io::copy(&mut input, &mut writer).map_err(|e| format!("{}: {}", name, e))?;
    }

    writer.finish().map_err(|e| e.to_string())?;
    tracing::debug!(files = files.len(), archive = %archive.display(), "Packed package");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_types() {
        assert!(AzureProvider::supports("key-vault-secret"));
        assert!(!AzureProvider::supports("cosmos-db"));
    }

    #[test]
    fn test_missing_input_names_resource() {
        let config = ResourceConfig::new("resource-group", "demo-rg", json!({"name": "demo-rg"}));
        let err = input(&config, "location").unwrap_err();
        assert_eq!(err.to_string(), "Resource 'demo-rg' is missing input 'location'");
    }

    #[test]
    fn test_key_value_args() {
        let settings = json!({
            "WEBSITES_PORT": "8080",
            "KeyVaultUri": "https://demo-kv.vault.azure.net/",
            "Retries": 3
        });
        let mut args = key_value_args(Some(&settings)).unwrap();
        args.sort();
        assert_eq!(
            args,
            vec![
                "KeyVaultUri=https://demo-kv.vault.azure.net/",
                "Retries=3",
                "WEBSITES_PORT=8080",
            ]
        );
        assert!(key_value_args(None).unwrap().is_empty());
    }

    #[test]
    fn test_connection_string_groups() {
        let strings = json!({
            "storage": {"value": "DefaultEndpointsProtocol=https;AccountName=demosa", "type": "Custom"},
            "sql": {"value": "Server=tcp:demo-sql.database.windows.net", "type": "SQLAzure"}
        });
        let groups = connection_string_groups(Some(&strings)).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups["SQLAzure"],
            vec!["sql=Server=tcp:demo-sql.database.windows.net"]
        );

        let broken = json!({"storage": {"type": "Custom"}});
        assert!(connection_string_groups(Some(&broken)).is_err());
    }

    #[test]
    fn test_attribute_lookup() {
        let state = ResourceState::new("demosa/data", "storage-table")
            .with_attribute("name", json!("data"));
        assert_eq!(attribute("demo-table", &state, "name").unwrap(), "data");
        assert!(matches!(
            attribute("demo-table", &state, "account_name"),
            Err(AzureError::MissingInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_package_source_passes_zip_files_through() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("site.zip");
        std::fs::write(&zip, b"PK").unwrap();

        let staging = tempfile::tempdir().unwrap();
        assert_eq!(package_source(&zip, staging.path()).await.unwrap(), zip);

        let missing = dir.path().join("missing");
        assert!(matches!(
            package_source(&missing, staging.path()).await,
            Err(AzureError::Packaging { .. })
        ));
    }

    #[tokio::test]
    async fn test_package_source_zips_directories() {
        let site = tempfile::tempdir().unwrap();
        std::fs::write(site.path().join("app.dll"), b"binary").unwrap();
        std::fs::create_dir(site.path().join("wwwroot")).unwrap();
        std::fs::write(site.path().join("wwwroot").join("index.html"), b"<h1>hi</h1>").unwrap();

        let staging = tempfile::tempdir().unwrap();
        let archive = package_source(site.path(), staging.path()).await.unwrap();
        assert_eq!(archive, staging.path().join("package.zip"));

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["app.dll", "wwwroot/index.html"]);

        let mut content = String::new();
        std::io::Read::read_to_string(&mut zip.by_name("wwwroot/index.html").unwrap(), &mut content)
            .unwrap();
        assert_eq!(content, "<h1>hi</h1>");
    }

    #[test]
    fn test_archive_path_accepts_resolved_archives() {
        let config = ResourceConfig::new(
            "storage-blob",
            "demo-package",
            json!({
                "source": {"path": "wwwroot", "sha256": "ab12"},
                "context": "app"
            }),
        );
        assert_eq!(archive_path(&config, "source").unwrap(), PathBuf::from("wwwroot"));
        assert_eq!(archive_path(&config, "context").unwrap(), PathBuf::from("app"));
        assert!(matches!(
            archive_path(&config, "missing"),
            Err(AzureError::MissingInput { .. })
        ));
    }
}

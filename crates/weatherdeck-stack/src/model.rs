//! Stack settings

use crate::error::{Result, StackError};
use crate::naming;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_LOCATION: &str = "westeurope";
pub const DEFAULT_IMAGE_TAG_PREFIX: &str = "latest";
pub const DEFAULT_SECRET_SUMMARY: &str = "Secret";
pub const DEFAULT_SQL_ADMIN: &str = "deckadmin";
pub const DEFAULT_ARCHIVE: &str = "wwwroot";
pub const DEFAULT_CONTEXT: &str = "app";

/// Environment variable consulted when the stack file has no SQL password
pub const SQL_PASSWORD_ENV: &str = "DECK_SQL_PASSWORD";

/// Deployment target of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Windows app service running from a zip package in blob storage
    Package,
    /// `Package` plus a key vault holding the app's secrets
    Vault,
    /// Linux app service running an image from a private registry
    Container,
    /// `Container` plus an Azure SQL database
    ContainerSql,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Package,
        Variant::Vault,
        Variant::Container,
        Variant::ContainerSql,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Package => "package",
            Variant::Vault => "vault",
            Variant::Container => "container",
            Variant::ContainerSql => "container-sql",
        }
    }

    pub fn uses_vault(&self) -> bool {
        !matches!(self, Variant::Package)
    }

    pub fn uses_container(&self) -> bool {
        matches!(self, Variant::Container | Variant::ContainerSql)
    }

    pub fn uses_sql(&self) -> bool {
        matches!(self, Variant::ContainerSql)
    }

    /// Weekday on which real deployments of this variant are refused
    pub fn freeze_day(&self) -> Option<Weekday> {
        match self {
            Variant::ContainerSql => Some(Weekday::Fri),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        Variant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| StackError::UnknownVariant(s.to_string()))
    }
}

/// Identity granted access to the stack's key vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub object_id: String,
    pub application_id: Option<String>,
}

/// Settings of one stack, as declared in `deck.kdl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    pub name: String,
    pub variant: Variant,
    pub tenant_id: Option<String>,
    pub location: String,
    pub image_tag_prefix: String,
    pub sql_admin: String,
    #[serde(skip_serializing)]
    pub sql_password: Option<String>,
    pub secret_summary: String,
    /// Directory or zip file deployed by the package variants
    pub archive: PathBuf,
    /// Image build context of the container variants
    pub context: PathBuf,
    pub operators: Vec<Operator>,
}

impl StackSettings {
    pub fn new(name: impl Into<String>, variant: Variant) -> Self {
        Self {
            name: name.into(),
            variant,
            tenant_id: None,
            location: DEFAULT_LOCATION.to_string(),
            image_tag_prefix: DEFAULT_IMAGE_TAG_PREFIX.to_string(),
            sql_admin: DEFAULT_SQL_ADMIN.to_string(),
            sql_password: None,
            secret_summary: DEFAULT_SECRET_SUMMARY.to_string(),
            archive: PathBuf::from(DEFAULT_ARCHIVE),
            context: PathBuf::from(DEFAULT_CONTEXT),
            operators: Vec::new(),
        }
    }

    /// Image tag pushed to and pulled from the registry
    pub fn image_tag(&self) -> &str {
        &self.image_tag_prefix
    }

    /// Fill the SQL password from the environment when the file has none
    pub fn apply_env(&mut self) {
        if self.sql_password.is_none()
            && let Ok(password) = std::env::var(SQL_PASSWORD_ENV)
            && !password.is_empty()
        {
            self.sql_password = Some(password);
        }
    }

    /// Make relative archive/context paths relative to `root`
    pub fn resolve_paths(&mut self, root: &Path) {
        if self.archive.is_relative() {
            self.archive = root.join(&self.archive);
        }
        if self.context.is_relative() {
            self.context = root.join(&self.context);
        }
    }

    /// Reject settings that cannot produce a deployable topology
    pub fn validate(&self) -> Result<()> {
        naming::validate_stack_name(&self.name)?;

        if self.tenant_id.as_deref().is_none_or(str::is_empty) {
            return Err(StackError::MissingSetting {
                stack: self.name.clone(),
                setting: "tenant-id",
            });
        }

        if self.operators.is_empty() {
            return Err(StackError::NoOperators(self.name.clone()));
        }

        for (i, operator) in self.operators.iter().enumerate() {
            if operator.object_id.is_empty() {
                return Err(StackError::MissingSetting {
                    stack: self.name.clone(),
                    setting: "operator object-id",
                });
            }
            if self.operators[..i].iter().any(|o| o.name == operator.name) {
                return Err(StackError::InvalidConfig(format!(
                    "operator '{}' is declared twice in stack '{}'",
                    operator.name, self.name
                )));
            }
        }

        if self.variant.uses_sql() && self.sql_password.as_deref().is_none_or(str::is_empty) {
            return Err(StackError::MissingSetting {
                stack: self.name.clone(),
                setting: "sql-password",
            });
        }

        if self.image_tag_prefix.is_empty() {
            return Err(StackError::InvalidConfig(
                "image-tag-prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

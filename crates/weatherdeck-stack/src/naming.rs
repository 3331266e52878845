//! Resource naming
//!
//! Every Azure name is derived from the stack prefix, the first nine
//! characters of the stack name. Names that Azure scopes globally (storage
//! account, registry, key vault, SQL server) are validated here against
//! Azure's character rules so a bad stack name fails before anything is
//! created.

use crate::error::{Result, StackError};

const PREFIX_LEN: usize = 9;

/// Name of the table created in the storage account
pub const TABLE_NAME: &str = "data";

/// Repository of the application image in the registry
pub const IMAGE_REPOSITORY: &str = "weatherforecast";

/// First nine characters of the stack name
pub fn stack_prefix(stack: &str) -> String {
    stack.chars().take(PREFIX_LEN).collect()
}

/// Stack names become part of every resource name
pub fn validate_stack_name(stack: &str) -> Result<()> {
    let invalid = |reason: &str| StackError::InvalidName {
        kind: "stack",
        name: stack.to_string(),
        reason: reason.to_string(),
    };

    let first = stack
        .chars()
        .next()
        .ok_or_else(|| invalid("must not be empty"))?;
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with a letter"));
    }
    if !stack.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("only letters, digits and '-' are allowed"));
    }
    Ok(())
}

/// Storage account name: lowercase prefix without dashes, suffixed with `sa`
pub fn storage_account_name(prefix: &str) -> Result<String> {
    let name = format!("{}sa", compact(prefix));
    check_length("storage account", &name, 3, 24)?;
    Ok(name)
}

/// Registry name: alphanumeric only
pub fn registry_name(prefix: &str) -> Result<String> {
    let name = format!("{}acr", compact(prefix));
    check_length("container registry", &name, 5, 50)?;
    Ok(name)
}

/// Key vault name: letters, digits and single dashes, starting with a letter
pub fn key_vault_name(prefix: &str) -> Result<String> {
    let name = format!("{}-kv", prefix);
    check_length("key vault", &name, 3, 24)?;
    if name.contains("--") {
        return Err(StackError::InvalidName {
            kind: "key vault",
            name,
            reason: "consecutive dashes are not allowed".to_string(),
        });
    }
    Ok(name)
}

/// SQL server name: lowercase letters, digits and dashes
pub fn sql_server_name(prefix: &str) -> Result<String> {
    let name = format!("{}-sql", prefix.to_lowercase());
    if name.starts_with('-') {
        return Err(StackError::InvalidName {
            kind: "sql server",
            name,
            reason: "must not start with '-'".to_string(),
        });
    }
    check_length("sql server", &name, 1, 63)?;
    Ok(name)
}

fn compact(prefix: &str) -> String {
    prefix.to_lowercase().replace('-', "")
}

fn check_length(kind: &'static str, name: &str, min: usize, max: usize) -> Result<()> {
    if name.len() < min || name.len() > max {
        return Err(StackError::InvalidName {
            kind,
            name: name.to_string(),
            reason: format!("must be {}-{} characters long", min, max),
        });
    }
    Ok(())
}

/// Names of every resource of a stack
#[derive(Debug, Clone)]
pub struct Names {
    prefix: String,
}

impl Names {
    pub fn for_stack(stack: &str) -> Result<Self> {
        validate_stack_name(stack)?;
        Ok(Self {
            prefix: stack_prefix(stack),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Logical name of a resource in the graph, e.g. `weather-d-rg`
    pub fn logical(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }

    pub fn resource_group(&self) -> String {
        self.logical("rg")
    }

    pub fn storage_account(&self) -> Result<String> {
        storage_account_name(&self.prefix)
    }

    pub fn app_service_plan(&self) -> String {
        self.logical("asp")
    }

    pub fn storage_container(&self) -> String {
        self.logical("c")
    }

    pub fn storage_blob(&self) -> String {
        self.logical("b")
    }

    pub fn app_insights(&self) -> String {
        self.logical("ai")
    }

    pub fn app_service(&self) -> String {
        self.logical("as")
    }

    pub fn key_vault(&self) -> Result<String> {
        key_vault_name(&self.prefix)
    }

    pub fn registry(&self) -> Result<String> {
        registry_name(&self.prefix)
    }

    pub fn sql_server(&self) -> Result<String> {
        sql_server_name(&self.prefix)
    }

    pub fn sql_database(&self) -> String {
        self.logical("db")
    }
}

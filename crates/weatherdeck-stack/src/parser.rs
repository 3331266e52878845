//! `deck.kdl` parser
//!
//! ```kdl
//! defaults {
//!     tenant-id "00000000-0000-0000-0000-000000000000"
//!     operator "alice" object-id="..." application-id="..."
//! }
//!
//! stack "weather-dev" {
//!     variant "vault"
//!     location "northeurope"
//!     secret-summary "Cloudy with a chance of secrets"
//! }
//! ```
//!
//! Settings inside `defaults` apply to every stack; a stack's own settings
//! override them and its operators are appended to the default ones.

use crate::error::{Result, StackError};
use crate::model::{Operator, StackSettings, Variant};
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::{Path, PathBuf};

/// Parse every stack declared in a file
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<Vec<StackSettings>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_stacks(&content)
}

/// Load one stack by name, with environment fallbacks applied and relative
/// paths resolved against `root`
pub fn load_stack(path: &Path, name: &str, root: &Path) -> Result<StackSettings> {
    let stacks = parse_stack_file(path)?;
    let available = stacks
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut settings = stacks
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .ok_or_else(|| StackError::StackNotFound {
            name: name.to_string(),
            available,
        })?;

    settings.apply_env();
    settings.resolve_paths(root);
    tracing::debug!(stack = %settings.name, variant = %settings.variant, "Loaded stack");
    Ok(settings)
}

/// Parse every stack declared in a KDL string
pub fn parse_stacks(content: &str) -> Result<Vec<StackSettings>> {
    let doc: KdlDocument = content.parse()?;

    let mut defaults: Vec<&KdlNode> = Vec::new();
    let mut stacks: Vec<StackSettings> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "defaults" => {
                if let Some(children) = node.children() {
                    defaults.extend(children.nodes());
                }
            }
            "stack" => {
                let settings = parse_stack(node, &defaults)?;
                if stacks.iter().any(|s| s.name == settings.name) {
                    return Err(StackError::DuplicateStack(settings.name));
                }
                stacks.push(settings);
            }
            other => {
                tracing::warn!(node = other, "Ignoring unknown top-level node");
            }
        }
    }

    Ok(stacks)
}

fn parse_stack(node: &KdlNode, defaults: &[&KdlNode]) -> Result<StackSettings> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("stack requires a name".to_string()))?
        .to_string();

    let children: Vec<&KdlNode> = node
        .children()
        .map(|c| c.nodes().iter().collect())
        .unwrap_or_default();

    let variant = children
        .iter()
        .chain(defaults.iter())
        .find(|c| c.name().value() == "variant")
        .map(|c| required_string(c).and_then(str::parse::<Variant>))
        .transpose()?
        .ok_or_else(|| StackError::MissingSetting {
            stack: name.clone(),
            setting: "variant",
        })?;

    let mut settings = StackSettings::new(name, variant);
    for child in defaults.iter().chain(children.iter()) {
        apply_setting(&mut settings, child)?;
    }

    Ok(settings)
}

fn apply_setting(settings: &mut StackSettings, node: &KdlNode) -> Result<()> {
    match node.name().value() {
        // resolved before the other settings
        "variant" => {}
        "tenant-id" | "tenant_id" => {
            settings.tenant_id = Some(required_string(node)?.to_string());
        }
        "location" => {
            settings.location = required_string(node)?.to_string();
        }
        "image-tag-prefix" | "image_tag_prefix" => {
            settings.image_tag_prefix = required_string(node)?.to_string();
        }
        "sql-admin" | "sql_admin" => {
            settings.sql_admin = required_string(node)?.to_string();
        }
        "sql-password" | "sql_password" => {
            settings.sql_password = Some(required_string(node)?.to_string());
        }
        "secret-summary" | "secret_summary" => {
            settings.secret_summary = required_string(node)?.to_string();
        }
        "archive" => {
            settings.archive = PathBuf::from(required_string(node)?);
        }
        "context" => {
            settings.context = PathBuf::from(required_string(node)?);
        }
        "operator" => {
            settings.operators.push(parse_operator(node)?);
        }
        other => {
            tracing::warn!(stack = %settings.name, setting = other, "Ignoring unknown setting");
        }
    }
    Ok(())
}

/// `operator "alice" object-id="..." application-id="..."`
fn parse_operator(node: &KdlNode) -> Result<Operator> {
    let name = required_string(node)?.to_string();
    let object_id = node
        .get("object-id")
        .and_then(|v| v.as_string())
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("operator '{}' requires object-id", name))
        })?
        .to_string();
    let application_id = node
        .get("application-id")
        .and_then(|v| v.as_string())
        .map(|s| s.to_string());

    Ok(Operator {
        name,
        object_id,
        application_id,
    })
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .first()
        .filter(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

fn required_string(node: &KdlNode) -> Result<&str> {
    first_string(node).ok_or_else(|| {
        StackError::InvalidConfig(format!("'{}' requires a string value", node.name().value()))
    })
}

pub mod destroy;
pub mod graph;
pub mod outputs;
pub mod preview;
pub mod up;
pub mod validate;

use anyhow::Context;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use weatherdeck_cloud::{ActionType, ApplyResult, Engine, Plan, StateManager};
use weatherdeck_cloud_azure::AzureProvider;
use weatherdeck_stack::StackSettings;

/// A stack file and the stack selected from it
pub struct Project {
    pub stack_file: PathBuf,
    pub root: PathBuf,
    pub settings: StackSettings,
}

impl Project {
    /// Find the stack file and load `stack`, or its only stack when unnamed
    pub fn load(stack: Option<String>) -> anyhow::Result<Self> {
        let stack_file = weatherdeck_config::find_stack_file()?;
        let root = weatherdeck_config::project_root(&stack_file);
        tracing::debug!(file = %stack_file.display(), "Using stack file");

        let name = match stack {
            Some(name) => name,
            None => only_stack(&stack_file)?,
        };
        let settings = weatherdeck_stack::load_stack(&stack_file, &name, &root)
            .with_context(|| format!("Failed to load stack from {}", stack_file.display()))?;

        Ok(Self {
            stack_file,
            root,
            settings,
        })
    }

    pub fn engine(&self, subscription: Option<String>) -> Engine {
        Engine::new(
            Arc::new(AzureProvider::new(subscription)),
            StateManager::new(&self.root, &self.settings.name),
        )
    }

    pub fn print_header(&self, action: &str) {
        println!(
            "{} {} ({})",
            action.blue().bold(),
            self.settings.name.cyan().bold(),
            self.settings.variant
        );
        println!(
            "  {}",
            self.stack_file.display().to_string().dimmed()
        );
        println!();
    }
}

fn only_stack(stack_file: &std::path::Path) -> anyhow::Result<String> {
    let stacks = weatherdeck_stack::parse_stack_file(stack_file)?;
    match stacks.as_slice() {
        [only] => Ok(only.name.clone()),
        [] => anyhow::bail!("{} declares no stacks", stack_file.display()),
        _ => {
            let names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
            anyhow::bail!(
                "Several stacks declared ({}); pass one as an argument or set DECK_STACK",
                names.join(", ")
            )
        }
    }
}

/// Make sure az is usable before touching anything
pub async fn ensure_authenticated(engine: &Engine) -> anyhow::Result<()> {
    let status = engine.check_auth().await?;
    if !status.authenticated {
        anyhow::bail!(
            "{} is not available: {}",
            engine.provider().display_name(),
            status.error.unwrap_or_default()
        );
    }
    if let Some(account) = status.account_info {
        println!("{} {}", "Account:".bold(), account);
    }
    Ok(())
}

pub fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green().bold(),
            ActionType::Update => "~".yellow().bold(),
            ActionType::Delete => "-".red().bold(),
            ActionType::NoOp => continue,
        };
        println!(
            "  {} {:<28} {}",
            marker,
            action.resource_id,
            action.resource_type.dimmed()
        );
        if action.action_type == ActionType::Update {
            for (key, value) in &action.details {
                println!("      {} = {}", key.dimmed(), value);
            }
        }
    }

    let summary = plan.summary();
    if plan.has_changes {
        println!();
        println!("{} {}", "Plan:".bold(), summary);
    } else {
        println!("{}", "No changes. Resources match the stack.".green());
    }
}

pub fn print_result(result: &ApplyResult) {
    for action in &result.succeeded {
        println!("  {} {}", "✓".green(), action.message);
    }
    for action in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            action.action_id,
            action.error.as_deref().unwrap_or_default()
        );
    }
    for id in &result.skipped {
        println!("  {} {} {}", "-".dimmed(), id, "(skipped)".dimmed());
    }
    println!();
    println!(
        "{} succeeded, {} failed, {} skipped in {:.1}s",
        result.succeeded.len(),
        result.failed.len(),
        result.skipped.len(),
        result.duration_ms as f64 / 1000.0
    );
}

pub fn print_outputs(outputs: &std::collections::BTreeMap<String, serde_json::Value>) {
    for (name, value) in outputs {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {:<22} {}", name.cyan(), value);
    }
}

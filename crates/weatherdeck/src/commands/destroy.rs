use super::{Project, ensure_authenticated, print_result};
use colored::Colorize;

pub async fn handle(
    stack: Option<String>,
    subscription: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    project.print_header("Destroying");

    let engine = project.engine(subscription);
    let state = engine.state_manager().load().await?;
    let order = state.deletion_order();
    if order.is_empty() {
        println!("{}", "Nothing to destroy.".green());
        return Ok(());
    }

    for id in &order {
        let resource_type = state
            .get_resource(id)
            .map(|r| r.resource_type.as_str())
            .unwrap_or_default();
        println!("  {} {:<28} {}", "-".red().bold(), id, resource_type.dimmed());
    }

    if !yes {
        println!();
        println!("{}", "→ Run again with --yes to delete these resources".yellow());
        return Ok(());
    }

    println!();
    ensure_authenticated(&engine).await?;
    let result = engine.destroy().await?;
    print_result(&result);

    if !result.is_success() {
        anyhow::bail!("{} resource(s) could not be deleted", result.failed.len());
    }

    Ok(())
}

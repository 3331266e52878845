use super::{Project, ensure_authenticated, print_outputs, print_plan, print_result};
use colored::Colorize;
use weatherdeck_stack::{RenderContext, render};

pub async fn handle(
    stack: Option<String>,
    subscription: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    project.print_header("Deploying");

    let graph = render(&project.settings, &RenderContext::apply())?;
    let engine = project.engine(subscription);

    let plan = engine.preview(&graph).await?;
    print_plan(&plan);
    if !plan.has_changes {
        return Ok(());
    }

    if !yes {
        println!();
        println!("{}", "→ Run again with --yes to apply".yellow());
        return Ok(());
    }

    println!();
    ensure_authenticated(&engine).await?;
    let result = engine.up(&graph).await?;
    print_result(&result);

    if !result.is_success() {
        anyhow::bail!("{} resource(s) failed to deploy", result.failed.len());
    }

    let outputs = engine.outputs().await?;
    if !outputs.is_empty() {
        println!();
        println!("{}", "Outputs:".bold());
        print_outputs(&outputs);
    }

    Ok(())
}

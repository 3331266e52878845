use super::Project;
use colored::Colorize;
use weatherdeck_stack::{RenderContext, render};

pub fn handle(stack: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    project.print_header("Validating");

    let graph = render(&project.settings, &RenderContext::dry_run())?;
    let settings = &project.settings;

    println!("{}", "✓ Stack is valid".green().bold());
    println!();
    println!("  location:  {}", settings.location);
    println!("  operators: {}", settings.operators.len());
    for operator in &settings.operators {
        println!("    - {}", operator.name.cyan());
    }
    println!("  resources: {}", graph.len());
    println!("  outputs:   {}", graph.outputs().len());
    if let Some(day) = settings.variant.freeze_day() {
        println!(
            "  {}",
            format!("deploys are frozen on {}", day).yellow()
        );
    }

    Ok(())
}

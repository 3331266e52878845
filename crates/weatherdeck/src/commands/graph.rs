use super::Project;
use colored::Colorize;
use weatherdeck_stack::{RenderContext, render};

pub fn handle(stack: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    project.print_header("Graph of");

    let graph = render(&project.settings, &RenderContext::dry_run())?;
    for (index, wave) in graph.waves()?.iter().enumerate() {
        println!("{}", format!("Wave {}", index + 1).bold());
        for id in wave {
            let Some(decl) = graph.get(id) else { continue };
            let deps: Vec<String> = graph.dependencies(id).iter().map(|d| d.to_string()).collect();
            if deps.is_empty() {
                println!("  {:<28} {}", id.to_string().cyan(), decl.resource_type.dimmed());
            } else {
                println!(
                    "  {:<28} {} {} {}",
                    id.to_string().cyan(),
                    decl.resource_type.dimmed(),
                    "←".dimmed(),
                    deps.join(", ").dimmed()
                );
            }
        }
    }

    Ok(())
}

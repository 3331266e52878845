use super::{Project, print_outputs};
use colored::Colorize;

pub async fn handle(stack: Option<String>, json: bool) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    let engine = project.engine(None);
    let outputs = engine.outputs().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    if outputs.is_empty() {
        println!(
            "{} has no outputs yet; run {} first",
            project.settings.name.cyan(),
            "deck up".bold()
        );
        println!(
            "  {}",
            weatherdeck_config::state_dir(&project.root)
                .display()
                .to_string()
                .dimmed()
        );
        return Ok(());
    }

    print_outputs(&outputs);
    Ok(())
}

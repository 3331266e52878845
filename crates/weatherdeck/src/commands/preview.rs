use super::{Project, print_plan};
use weatherdeck_stack::{RenderContext, render};

pub async fn handle(stack: Option<String>, subscription: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(stack)?;
    project.print_header("Previewing");

    // dry-run: the freeze does not apply and nothing reaches Azure
    let graph = render(&project.settings, &RenderContext::dry_run())?;
    let plan = project.engine(subscription).preview(&graph).await?;
    print_plan(&plan);

    Ok(())
}

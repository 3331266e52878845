mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use weatherdeck_stack::StackError;

/// Exit code for a deploy refused by the deployment freeze
const EXIT_FROZEN: i32 = 3;

#[derive(Parser)]
#[command(name = "deck")]
#[command(about = "Declare, preview and deploy the weather forecast service on Azure", long_about = None)]
struct Cli {
    /// Azure subscription to deploy into (defaults to the az CLI's current one)
    #[arg(long, global = true, env = "AZURE_SUBSCRIPTION_ID")]
    subscription: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a stack's settings and topology
    Validate {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
    },
    /// Show resources in dependency order
    Graph {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
    },
    /// Dry-run: show what `up` would change
    Preview {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
    },
    /// Create or update a stack's resources
    Up {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
        /// Apply without stopping at the plan
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every resource of a stack
    Destroy {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
        /// Delete without stopping at the list
        #[arg(short, long)]
        yes: bool,
    },
    /// Show a stack's outputs from its last deploy
    Outputs {
        /// Stack name (or DECK_STACK)
        #[arg(env = "DECK_STACK")]
        stack: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // logs go to stderr so outputs stay pipeable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        let code = exit_code(&e);
        if code == EXIT_FROZEN {
            eprintln!("{}", e.to_string().yellow().bold());
        } else {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
        }
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let subscription = cli.subscription;

    match cli.command {
        Commands::Version => {
            println!("weatherdeck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Validate { stack } => commands::validate::handle(stack),
        Commands::Graph { stack } => commands::graph::handle(stack),
        Commands::Preview { stack } => commands::preview::handle(stack, subscription).await,
        Commands::Up { stack, yes } => commands::up::handle(stack, subscription, yes).await,
        Commands::Destroy { stack, yes } => {
            commands::destroy::handle(stack, subscription, yes).await
        }
        Commands::Outputs { stack, json } => commands::outputs::handle(stack, json).await,
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<StackError>() {
        Some(e) if e.is_frozen() => EXIT_FROZEN,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_exit_codes() {
        let frozen = anyhow::Error::new(StackError::DeploymentFrozen { day: Weekday::Fri });
        assert_eq!(exit_code(&frozen), EXIT_FROZEN);

        let invalid = anyhow::Error::new(StackError::UnknownVariant("blue-green".to_string()));
        assert_eq!(exit_code(&invalid), 1);

        let other = anyhow::anyhow!("az login required");
        assert_eq!(exit_code(&other), 1);
    }
}

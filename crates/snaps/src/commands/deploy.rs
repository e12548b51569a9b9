use super::launcher;
use crate::environment::Environment;
use colored::Colorize;
use tracing::error;

pub async fn handle(env: Environment) -> anyhow::Result<()> {
    println!("{}", format!("Deploying {}", env.path.display()).blue());

    if env.config.is_empty() && env.config.ansible.is_empty() {
        println!("{}", "Nothing to deploy".yellow());
        return Ok(());
    }

    let mut launcher = launcher(env);
    match launcher.deploy().await {
        Ok(()) => {
            println!();
            println!(
                "{}",
                format!("✓ Deployed {} resources", launcher.creators().count())
                    .green()
                    .bold()
            );
            for realized in launcher.realized() {
                println!(
                    "  • {} {} ({})",
                    realized.kind(),
                    realized.name().cyan(),
                    realized.id()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Deployment failed");
            println!();
            println!("{}", "✗ Deployment failed".red().bold());
            println!("  Resources created so far were left in place; run with --clean to remove them.");
            Err(e.into())
        }
    }
}

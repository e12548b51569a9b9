use super::launcher;
use crate::environment::Environment;
use colored::Colorize;

pub async fn handle(env: Environment, clean_images: bool) -> anyhow::Result<()> {
    println!("{}", format!("Cleaning {}", env.path.display()).yellow());

    let mut launcher = launcher(env);
    let report = launcher.clean(clean_images).await?;

    for (kind, name) in &report.cleaned {
        println!("  ✓ {} {}", kind, name.cyan());
    }
    for name in &report.kept {
        println!("  ℹ Kept image {} (use --clean-images to delete it)", name.cyan());
    }
    for failure in &report.failures {
        println!(
            "  {}",
            format!("⚠ {} {}: {}", failure.kind, failure.name, failure.error).yellow()
        );
    }

    println!();
    if !report.is_clean() {
        anyhow::bail!(
            "Clean failed for {} resource(s); they may still exist",
            report.failures.len()
        );
    }
    println!("{}", "✓ Clean complete".green().bold());
    Ok(())
}

//! `vapprun start`, `vapprun stop` and `vapprun shutdown`

use super::workspace;
use anyhow::Result;
use colored::Colorize;
use tracing::debug;
use vapprun_core::RunOptions;

/// Power on an entity and its children.
pub async fn start(name: &str, options: RunOptions) -> Result<()> {
    let mut orchestrator = workspace::open(options).await?;
    let id = orchestrator.inventory().find(name)?;

    if report(orchestrator.start_action(id).await)? {
        println!("{} Started {}", "✓".green().bold(), name.bold());
    }
    Ok(())
}

/// Power off an entity and its children.
pub async fn stop(name: &str, force: bool, options: RunOptions) -> Result<()> {
    let mut orchestrator = workspace::open(options).await?;
    let id = orchestrator.inventory().find(name)?;

    if report(orchestrator.stop_action(id, force, false).await)? {
        println!("{} Stopped {}", "✓".green().bold(), name.bold());
    }
    Ok(())
}

/// Hard power off, without complaining about stopped entities.
pub async fn shutdown(name: &str, options: RunOptions) -> Result<()> {
    let mut orchestrator = workspace::open(options).await?;
    let id = orchestrator.inventory().find(name)?;

    orchestrator.shutdown_action(id).await?;
    println!("{} Shut down {}", "✓".green().bold(), name.bold());
    Ok(())
}

/// Print and swallow non-fatal errors. Returns whether the action ran.
fn report(result: vapprun_core::Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if !e.is_fatal() => {
            debug!(error = ?e, "Action skipped");
            eprintln!("{} {}", "Error:".yellow().bold(), e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

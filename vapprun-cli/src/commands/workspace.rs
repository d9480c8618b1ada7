//! `vapprun init` and workspace discovery

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, info};
use vapprun_core::paths::{self, WORKSPACE_CFG_NAME};
use vapprun_core::{AdapterFactory, Inventory, Orchestrator, RunOptions, VappError, WorkspaceConfig};

/// Create a workspace in the current directory.
pub fn init() -> Result<()> {
    let dir = std::env::current_dir().context("Failed to read current directory")?;
    if paths::workspace_cfg_path(&dir).exists() {
        bail!("{:?} is already a vapprun workspace", dir);
    }
    let config = WorkspaceConfig::create_default(&dir)?;
    info!(range = %config.network.range(), "Initialized workspace");

    println!("{} Created workspace in {}", "✓".green().bold(), dir.display().to_string().bold());
    println!("  IP pool: {}", config.network.range());
    Ok(())
}

/// Workspace containing the current directory.
pub fn locate() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let dir = paths::locate_workspace(&cwd).ok_or_else(|| VappError::WorkspaceNotFound {
        start: cwd,
        file: WORKSPACE_CFG_NAME.to_string(),
    })?;
    debug!("Using workspace {:?}", dir);
    Ok(dir)
}

/// Load the workspace, wire the adapters and refresh power state.
pub async fn open(options: RunOptions) -> Result<Orchestrator> {
    let dir = locate()?;
    let inventory = Inventory::load(&dir)?;
    debug!(entities = inventory.ids().count(), "Loaded inventory");

    let factory = AdapterFactory::from_env();
    let backend = factory.control_backend(&options)?;
    let iso = factory.iso_builder();

    let mut orchestrator = Orchestrator::new(inventory, backend, iso, options);
    orchestrator.refresh().await?;
    Ok(orchestrator)
}

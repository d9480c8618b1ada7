//! Adapter factory: locates external tools and builds the adapters.
//!
//! Tools are looked up on `PATH`, followed by the VMware product directories
//! of the current platform.

use crate::adapters::{ControlBackend, IsoBuilder, MkisofsBuilder, VmrunBackend};
use crate::config::RunOptions;
use crate::error::{Result, VappError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[cfg(target_os = "macos")]
const EXTRA_PATH: &[&str] = &[
    "/Library/Application Support/VMware Fusion",
    "/Applications/VMware Fusion.app/Contents/Library",
];

#[cfg(windows)]
const EXTRA_PATH: &[&str] = &[
    r"C:\Program Files (x86)\VMware\VMware VIX",
    r"C:\Program Files (x86)\VMware\VMware Workstation",
    r"C:\Program Files\VMware\VMware VIX",
    r"C:\Program Files\VMware\VMware Workstation",
];

#[cfg(not(any(target_os = "macos", windows)))]
const EXTRA_PATH: &[&str] = &[];

pub const VMRUN_TOOL: &str = "vmrun";
pub const MKISOFS_TOOL: &str = "mkisofs";

/// Factory for the control backend and the ISO builder.
#[derive(Debug, Clone)]
pub struct AdapterFactory {
    search_path: Vec<PathBuf>,
}

impl AdapterFactory {
    /// Search `PATH` plus the platform's VMware directories.
    pub fn from_env() -> Self {
        let mut search_path: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        search_path.extend(EXTRA_PATH.iter().map(PathBuf::from));
        Self { search_path }
    }

    /// Search only the given directories.
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Locate an executable by name.
    pub fn find_tool(&self, name: &str) -> Result<PathBuf> {
        let file = if cfg!(windows) { format!("{}.exe", name) } else { name.to_string() };
        self.search_path
            .iter()
            .map(|dir| dir.join(&file))
            .find(|p| is_executable(p))
            .ok_or_else(|| VappError::CommandNotFound { command: name.to_string() })
    }

    #[instrument(skip(self))]
    pub fn control_backend(&self, options: &RunOptions) -> Result<Arc<dyn ControlBackend>> {
        let path = self.find_tool(VMRUN_TOOL)?;
        info!(tool = %path.display(), "Using vmrun control backend");
        Ok(Arc::new(VmrunBackend::new(path, options.gui)))
    }

    /// ISO builder backed by `mkisofs`. A missing tool only surfaces when an
    /// image is actually built, so commands that never publish still work.
    #[instrument(skip(self))]
    pub fn iso_builder(&self) -> Arc<dyn IsoBuilder> {
        let path = self.find_tool(MKISOFS_TOOL).unwrap_or_else(|_| {
            debug!("mkisofs not found on search path");
            PathBuf::from(MKISOFS_TOOL)
        });
        debug!(tool = %path.display(), "Using mkisofs");
        Arc::new(MkisofsBuilder::new(path))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

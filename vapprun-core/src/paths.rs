//! Centralized path configuration for vapprun.
//!
//! All workspace file names go through this module so the loader, the
//! orchestrator and the CLI agree on the on-disk layout.

use std::path::{Component, Path, PathBuf};

/// Workspace configuration file at the workspace root.
pub const WORKSPACE_CFG_NAME: &str = "vapprun.cfg";

/// Entity configuration for a VM.
pub const VM_CFG_NAME: &str = "vm.cfg";

/// Entity configuration for a vApp.
pub const VAPP_CFG_NAME: &str = "vapp.cfg";

/// Deploy parameters, persisted beside each tree root.
pub const DEPLOY_CFG_NAME: &str = "deploy.cfg";

/// Environment image attached to the VM's optical device.
pub const OVF_ENV_ISO_NAME: &str = "ovf-env.iso";

/// Plain copy of the environment document, written beside the VM.
pub const OVF_ENV_XML_NAME: &str = "ovf-env.xml";

/// Get the deploy parameter file for an entity directory.
pub fn deploy_cfg_path(entity_dir: &Path) -> PathBuf {
    entity_dir.join(DEPLOY_CFG_NAME)
}

/// Get the workspace config file for a workspace directory.
pub fn workspace_cfg_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(WORKSPACE_CFG_NAME)
}

/// Locate the workspace containing `start`.
///
/// Walks from `start` towards the filesystem root and returns the first
/// directory holding a `vapprun.cfg`.
pub fn locate_workspace(start: &Path) -> Option<PathBuf> {
    start.ancestors().find(|dir| workspace_cfg_path(dir).is_file()).map(Path::to_path_buf)
}

/// Express `path` relative to `base` when it lives below it, otherwise return
/// it unchanged.
pub fn relative_to(base: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rel) if rel.components().next().is_some() => rel.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Resolve `path` against `base` and drop `.` / `..` components lexically.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_workspace_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(WORKSPACE_CFG_NAME), "<vapprun configVersion=\"1\"/>")
            .unwrap();
        let nested = dir.path().join("web").join("disk");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(locate_workspace(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_locate_workspace_missing() {
        let dir = tempfile::tempdir().unwrap();
        // The temp dir itself has no config; ancestors normally don't either.
        let found = locate_workspace(dir.path());
        assert!(found.map(|p| !p.starts_with(dir.path())).unwrap_or(true));
    }

    #[test]
    fn test_relative_and_resolve() {
        let base = Path::new("/ws/web");
        assert_eq!(relative_to(base, Path::new("/ws/web/vm/web.vmx")), PathBuf::from("vm/web.vmx"));
        assert_eq!(relative_to(base, Path::new("/other/web.vmx")), PathBuf::from("/other/web.vmx"));
        assert_eq!(resolve(base, Path::new("./vm/../web.vmx")), PathBuf::from("/ws/web/web.vmx"));
        assert_eq!(resolve(base, Path::new("/abs/x.vmx")), PathBuf::from("/abs/x.vmx"));
    }
}

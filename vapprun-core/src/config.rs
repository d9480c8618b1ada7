//! Configuration management.
//!
//! Two kinds of configuration exist: the persisted workspace file
//! (`vapprun.cfg`) and the per-invocation [`RunOptions`] handed to the
//! orchestrator by the caller.

use crate::error::{Result, VappError};
use crate::paths;
use crate::xml::XmlNode;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Workspace format version. Bumped on incompatible layout changes.
pub const VAPPRUN_CONFIG_VERSION: &str = "1";

/// Network settings from the workspace `ipPool` node.
///
/// Entries keep document order. An entry without text is present but has no
/// value, which makes `${name:Network}` lookups fail for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    entries: IndexMap<String, Option<String>>,
}

impl NetworkSettings {
    /// Value of the named setting, if it exists and has text.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(|v| v.as_deref())
    }

    /// The IP pool specification (`A.B.C.D#N`), empty when unset.
    pub fn range(&self) -> &str {
        self.lookup("range").unwrap_or("")
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), Some(value.into()));
    }

    fn from_node(node: &XmlNode) -> Self {
        let entries = node
            .children
            .iter()
            .map(|c| (c.tag.clone(), c.text.as_ref().map(|t| t.trim().to_string())))
            .collect();
        Self { entries }
    }

    fn to_node(&self) -> XmlNode {
        self.entries.iter().fold(XmlNode::new("ipPool"), |node, (k, v)| {
            node.with_child(XmlNode::text_node(k.clone(), v.clone().unwrap_or_default()))
        })
    }
}

/// Persistent workspace configuration.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Workspace root directory.
    pub dir: PathBuf,
    pub network: NetworkSettings,
}

impl WorkspaceConfig {
    /// Load `vapprun.cfg` from a workspace directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = paths::workspace_cfg_path(dir);
        debug!("Loading workspace config from {:?}", path);

        let node = XmlNode::read_file(&path)?.ok_or_else(|| VappError::InvalidConfig {
            path: path.clone(),
            reason: "file not found".to_string(),
        })?;
        Self::from_node(dir, &path, &node)
    }

    fn from_node(dir: &Path, path: &Path, node: &XmlNode) -> Result<Self> {
        if node.tag != "vapprun" {
            return Err(VappError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("invalid root element '{}'", node.tag),
            });
        }

        let version = node.attr_or("configVersion", "0");
        if version != VAPPRUN_CONFIG_VERSION {
            return Err(VappError::UnsupportedConfigVersion {
                version: version.to_string(),
                supported: VAPPRUN_CONFIG_VERSION.to_string(),
            });
        }

        let network = node.child("ipPool").map(NetworkSettings::from_node).unwrap_or_default();
        Ok(Self { dir: dir.to_path_buf(), network })
    }

    /// Default settings for a new workspace.
    pub fn default_network() -> NetworkSettings {
        let mut network = NetworkSettings::default();
        network.set("netmask", "255.255.255.0");
        network.set("gateway", "192.168.0.1");
        network.set("domainName", "example.com");
        network.set("hostPrefix", "vapprun-");
        network.set("dns", "");
        network.set("searchPath", "");
        network.set("httpProxy", "");
        network.set("range", "192.168.0.200#8");
        network
    }

    /// Create a new workspace in `dir` with the default network settings.
    pub fn create_default(dir: &Path) -> Result<Self> {
        let config = Self { dir: dir.to_path_buf(), network: Self::default_network() };
        config.save()?;
        info!("Created workspace in {:?}", dir);
        Ok(config)
    }

    /// Write the configuration back to `vapprun.cfg`.
    pub fn save(&self) -> Result<()> {
        XmlNode::new("vapprun")
            .with_attr("configVersion", VAPPRUN_CONFIG_VERSION)
            .with_child(self.network.to_node())
            .write_file(&paths::workspace_cfg_path(&self.dir))
    }
}

/// Per-invocation options threaded through the orchestrator.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Regenerate environments but never change power state.
    pub dry_run: bool,
    /// Log every resolved property when an entity starts.
    pub verbose: bool,
    /// Power VMs on with a console window.
    pub gui: bool,
    /// Length of one wait step in the post-start poll loop.
    pub poll_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { dry_run: false, verbose: false, gui: false, poll_interval: Duration::from_secs(1) }
    }
}

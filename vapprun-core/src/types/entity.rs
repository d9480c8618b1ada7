//! Entity domain types: VMs, vApps and their power state.

use crate::error::{Result, VappError};
use crate::paths;
use crate::types::link::Link;
use crate::types::property::Property;
use crate::xml::XmlNode;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable index of an entity in the inventory arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

/// Observed power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Not queried yet.
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::PoweredOn => write!(f, "Powered On"),
            Self::PoweredOff => write!(f, "Powered Off"),
        }
    }
}

/// How the environment document reaches the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSet {
    /// Attached ISO image holding `ovf-env.xml`.
    pub iso: bool,
    /// Inline `guestinfo.ovfEnv` configuration key.
    pub guest_info: bool,
}

impl TransportSet {
    /// Interpret transport tokens case-insensitively. When neither known
    /// transport is named, both are used.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let lower: Vec<String> = tokens.iter().map(|t| t.as_ref().to_lowercase()).collect();
        let iso = lower.iter().any(|t| t == "iso");
        let guest_info = lower.iter().any(|t| t == "com.vmware.guestinfo");
        if !iso && !guest_info {
            return Self { iso: true, guest_info: true };
        }
        Self { iso, guest_info }
    }
}

/// VM-only data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSection {
    /// Transport tokens as written in `vm.cfg`.
    pub transport: Vec<String>,
    /// Absolute path of the VM configuration (`.vmx`) file.
    pub vmx_path: PathBuf,
}

impl VmSection {
    pub fn transports(&self) -> TransportSet {
        TransportSet::from_tokens(&self.transport)
    }
}

/// Closed set of entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    VApp,
    Vm(VmSection),
}

/// A VM or vApp in the workspace.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Entity name (its directory name).
    pub name: String,
    /// Entity directory.
    pub dir: PathBuf,
    pub kind: EntityKind,
    /// Present on every non-root entity.
    pub link: Option<Link>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub properties: Vec<Property>,
    pub state: PowerState,
    /// Last observed guest address (empty when unknown).
    pub ip: String,
    pub tag: String,
    /// URL template with `${key}` placeholders.
    pub app_url: String,
    /// Resolved environment, recomputed on every start/stop pass.
    pub ovf_env_props: Option<IndexMap<String, String>>,
}

impl Entity {
    fn new(name: impl Into<String>, dir: impl Into<PathBuf>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            kind,
            link: None,
            parent: None,
            children: Vec::new(),
            properties: Vec::new(),
            state: PowerState::Unknown,
            ip: String::new(),
            tag: String::new(),
            app_url: String::new(),
            ovf_env_props: None,
        }
    }

    /// A vApp with no properties.
    pub fn vapp(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::new(name, dir, EntityKind::VApp)
    }

    /// A VM with no properties.
    pub fn vm(name: impl Into<String>, dir: impl Into<PathBuf>, vmx_path: impl Into<PathBuf>) -> Self {
        Self::new(
            name,
            dir,
            EntityKind::Vm(VmSection { transport: Vec::new(), vmx_path: vmx_path.into() }),
        )
    }

    pub fn is_vm(&self) -> bool {
        matches!(self.kind, EntityKind::Vm(_))
    }

    pub fn vm_section(&self) -> Option<&VmSection> {
        match &self.kind {
            EntityKind::Vm(vm) => Some(vm),
            EntityKind::VApp => None,
        }
    }

    pub fn is_powered_on(&self) -> bool {
        self.state == PowerState::PoweredOn
    }

    /// Root element tag of the entity's config file.
    pub fn root_tag(&self) -> &'static str {
        match self.kind {
            EntityKind::VApp => "vapp",
            EntityKind::Vm(_) => "vm",
        }
    }

    /// Path of the entity's config file.
    pub fn cfg_path(&self) -> PathBuf {
        match self.kind {
            EntityKind::VApp => self.dir.join(paths::VAPP_CFG_NAME),
            EntityKind::Vm(_) => self.dir.join(paths::VM_CFG_NAME),
        }
    }

    /// Handle for control-backend calls. `None` for vApps.
    pub fn vm_handle(&self) -> Option<VmHandle> {
        self.vm_section()
            .map(|vm| VmHandle { name: self.name.clone(), vmx_path: vm.vmx_path.clone() })
    }

    /// Load an entity from its directory, if it holds `vm.cfg` or `vapp.cfg`.
    pub fn load(name: &str, dir: &Path) -> Result<Option<Self>> {
        let vm_path = dir.join(paths::VM_CFG_NAME);
        let vapp_path = dir.join(paths::VAPP_CFG_NAME);

        let (mut entity, cfg_path) = if vm_path.is_file() {
            (Self::vm(name, dir, PathBuf::new()), vm_path)
        } else if vapp_path.is_file() {
            (Self::vapp(name, dir), vapp_path)
        } else {
            return Ok(None);
        };

        let node = XmlNode::read_file(&cfg_path)?.ok_or_else(|| VappError::InvalidConfig {
            path: cfg_path.clone(),
            reason: "file disappeared while loading".to_string(),
        })?;
        if node.tag != entity.root_tag() {
            return Err(VappError::InvalidConfig {
                path: cfg_path,
                reason: format!("Invalid root element: {}", node.tag),
            });
        }

        entity.load_root_attributes(&node);
        for child in &node.children {
            entity.load_section(child);
        }
        Ok(Some(entity))
    }

    fn load_root_attributes(&mut self, node: &XmlNode) {
        self.tag = node.attr("tag").to_string();
        self.app_url = node.attr("appUrl").to_string();
        if let EntityKind::Vm(vm) = &mut self.kind {
            vm.transport = node.attr("transport").split_whitespace().map(str::to_string).collect();
        }
    }

    fn load_section(&mut self, node: &XmlNode) {
        if let Some(prop) = Property::from_xml(node) {
            self.properties.push(prop);
            return;
        }
        if let Some(link) = Link::from_xml(node) {
            self.link = Some(link);
            return;
        }
        if node.tag == "vmx" {
            let dir = self.dir.clone();
            if let EntityKind::Vm(vm) = &mut self.kind {
                vm.vmx_path = paths::resolve(&dir, Path::new(node.attr("file")));
            }
        }
    }

    /// Serialize the entity back into its config file format.
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new(self.root_tag());
        if !self.tag.is_empty() {
            node = node.with_attr("tag", &self.tag);
        }
        if !self.app_url.is_empty() {
            node = node.with_attr("appUrl", &self.app_url);
        }
        if let EntityKind::Vm(vm) = &self.kind {
            if !vm.transport.is_empty() {
                node = node.with_attr("transport", vm.transport.join(" "));
            }
        }

        if let Some(link) = &self.link {
            node = node.with_child(link.to_xml());
        }
        for prop in &self.properties {
            node = node.with_child(prop.to_xml());
        }
        if let EntityKind::Vm(vm) = &self.kind {
            let rel = paths::relative_to(&self.dir, &vm.vmx_path);
            node = node.with_child(XmlNode::new("vmx").with_attr("file", rel.to_string_lossy()));
        }
        node
    }

    /// Rewrite the entity's config file.
    pub fn save(&self) -> Result<()> {
        self.to_xml().write_file(&self.cfg_path())
    }
}

/// Handle identifying a VM to the control backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmHandle {
    /// Entity name, for diagnostics.
    pub name: String,
    /// VM configuration file the backend operates on.
    pub vmx_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_tokens() {
        assert_eq!(TransportSet::from_tokens(&["iso"]), TransportSet { iso: true, guest_info: false });
        assert_eq!(
            TransportSet::from_tokens(&["com.vmware.guestInfo"]),
            TransportSet { iso: false, guest_info: true }
        );
        assert_eq!(TransportSet::from_tokens::<&str>(&[]), TransportSet { iso: true, guest_info: true });
        assert_eq!(TransportSet::from_tokens(&["ISO", "bogus"]), TransportSet { iso: true, guest_info: false });
    }

    #[test]
    fn test_load_vm_and_save_round_trip() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ws.path().join("web");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(paths::VM_CFG_NAME),
            r#"<vm transport="iso com.vmware.guestInfo" appUrl="http://${web.ip}/">
  <link name="app" startOrder="10"/>
  <property key="web.ip" type="ip:Network" value=""/>
  <vmx file="vm/web.vmx"/>
</vm>"#,
        )
        .unwrap();

        let entity = Entity::load("web", &dir).unwrap().unwrap();
        assert!(entity.is_vm());
        assert_eq!(entity.link.as_ref().unwrap().start_order, 10);
        assert_eq!(entity.properties.len(), 1);
        assert_eq!(entity.vm_section().unwrap().vmx_path, dir.join("vm").join("web.vmx"));
        assert_eq!(entity.app_url, "http://${web.ip}/");

        entity.save().unwrap();
        let reloaded = Entity::load("web", &dir).unwrap().unwrap();
        assert_eq!(reloaded.kind, entity.kind);
        assert_eq!(reloaded.properties, entity.properties);
        assert_eq!(reloaded.link, entity.link);
    }

    #[test]
    fn test_load_wrong_root_tag() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join(paths::VAPP_CFG_NAME), "<vm/>").unwrap();
        assert!(matches!(Entity::load("x", ws.path()), Err(VappError::InvalidConfig { .. })));
    }

    #[test]
    fn test_load_plain_directory() {
        let ws = tempfile::tempdir().unwrap();
        assert!(Entity::load("x", ws.path()).unwrap().is_none());
    }
}

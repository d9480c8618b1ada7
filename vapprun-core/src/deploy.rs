//! Deploy parameters: the persisted, user-editable values of a vApp tree.
//!
//! One instance exists per tree root and is shared by every descendant. It is
//! seeded with every property key found in the subtree and persisted as
//! `deploy.cfg` beside the root entity.

use crate::error::{Result, VappError};
use crate::network::IpPool;
use crate::xml::XmlNode;
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// How IP-typed properties get their values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// The user supplies every address.
    #[default]
    Fixed,
    /// Addresses are learned from the guest after power-on.
    Dhcp,
    /// Addresses are drawn from the workspace pool at power-on.
    Transient,
    /// Unrecognised policy name, kept verbatim. Behaves like `Transient`.
    Other(String),
}

impl AllocationPolicy {
    pub fn parse(s: &str) -> Self {
        match s {
            "fixed" => Self::Fixed,
            "dhcp" => Self::Dhcp,
            "transient" => Self::Transient,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Fixed => "fixed",
            Self::Dhcp => "dhcp",
            Self::Transient => "transient",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property keys collected across a subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropKeys {
    pub all: IndexSet<String>,
    pub ip: IndexSet<String>,
    pub user: IndexSet<String>,
    /// Non-empty literal defaults.
    pub defaults: IndexMap<String, String>,
}

impl PropKeys {
    /// Fold another subtree's keys into this one.
    pub fn merge(&mut self, other: PropKeys) {
        self.all.extend(other.all);
        self.ip.extend(other.ip);
        self.user.extend(other.user);
        self.defaults.extend(other.defaults);
    }
}

/// Deploy parameters of one tree.
#[derive(Debug, Clone)]
pub struct DeployParams {
    config: IndexMap<String, String>,
    file: Option<PathBuf>,
    keys: PropKeys,
    pub allocation_policy: AllocationPolicy,
}

impl DeployParams {
    /// Seed parameters from the keys of a subtree.
    ///
    /// User-configurable and IP keys start out empty; non-empty defaults are
    /// then filled in.
    pub fn new(keys: PropKeys) -> Self {
        let mut config = IndexMap::new();
        for k in keys.user.iter().chain(keys.ip.iter()) {
            config.insert(k.clone(), String::new());
        }
        for (k, v) in &keys.defaults {
            if !v.is_empty() {
                config.insert(k.clone(), v.clone());
            }
        }
        Self { config, file: None, keys, allocation_policy: AllocationPolicy::Fixed }
    }

    /// Overlay values from a `deploy.cfg`. A missing file leaves the seeded
    /// values untouched; unknown keys in the file are dropped.
    #[instrument(skip(self))]
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.file = Some(path.to_path_buf());

        let Some(node) = XmlNode::read_file(path)? else {
            debug!("No deploy parameters at {:?}", path);
            return Ok(());
        };

        if node.tag != "deployParameters" {
            return Err(VappError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("Invalid format of file (root element '{}')", node.tag),
            });
        }

        if let Some(policy) = node.attrs.get("allocationPolicy") {
            self.allocation_policy = AllocationPolicy::parse(policy);
        }

        for child in &node.children {
            if let (Some(text), Some(slot)) = (&child.text, self.config.get_mut(&child.tag)) {
                *slot = text.trim().to_string();
            }
        }
        Ok(())
    }

    /// Persist to the file this instance was loaded from.
    pub fn save(&self) -> Result<()> {
        match &self.file {
            Some(path) => self.write_to_file(path),
            None => Ok(()),
        }
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        self.to_xml().write_file(path)
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn to_xml(&self) -> XmlNode {
        self.config.iter().fold(
            XmlNode::new("deployParameters")
                .with_attr("allocationPolicy", self.allocation_policy.as_str()),
            |node, (k, v)| node.with_child(XmlNode::text_node(k.clone(), v.clone())),
        )
    }

    pub fn is_fixed_policy(&self) -> bool {
        self.allocation_policy == AllocationPolicy::Fixed
    }

    pub fn is_dhcp_policy(&self) -> bool {
        self.allocation_policy == AllocationPolicy::Dhcp
    }

    /// Whether `key` is an IP key managed automatically under this policy.
    pub fn is_auto_ip_key(&self, key: &str) -> bool {
        !self.is_fixed_policy() && self.keys.ip.contains(key)
    }

    /// Keys the user may edit. Automatically managed IP keys are excluded.
    pub fn is_user_configurable_key(&self, key: &str) -> bool {
        self.keys.user.contains(key) && !self.is_auto_ip_key(key)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Current value, empty when the key is unknown.
    pub fn param(&self, key: &str) -> &str {
        self.config.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn config(&self) -> &IndexMap<String, String> {
        &self.config
    }

    pub fn ip_keys(&self) -> &IndexSet<String> {
        &self.keys.ip
    }

    /// User-editable entries, in key order.
    pub fn user_items(&self) -> Vec<(&str, &str)> {
        self.config
            .iter()
            .filter(|(k, _)| self.is_user_configurable_key(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Prepare IP-typed parameters for a power transition.
    ///
    /// Under the fixed policy a power-on only checks that every IP key has a
    /// value. Otherwise all IP values are released to the pool and cleared;
    /// on power-on under a pool-backed policy fresh addresses are allocated.
    #[instrument(skip(self, pool), fields(policy = %self.allocation_policy))]
    pub fn init_ip_props(&mut self, is_power_on: bool, pool: &mut IpPool) -> Result<()> {
        if self.is_fixed_policy() && is_power_on {
            for key in &self.keys.ip {
                if self.param(key).is_empty() {
                    return Err(VappError::MissingIpValue { key: key.clone() });
                }
            }
            return Ok(());
        }

        let ip_keys: Vec<String> = self.keys.ip.iter().cloned().collect();
        for key in &ip_keys {
            if let Ok(ip) = self.param(key).parse::<Ipv4Addr>() {
                pool.unreserve(ip);
            }
            self.set_param(key.clone(), "");
        }
        self.save()?;

        if self.is_dhcp_policy() || !is_power_on {
            return Ok(());
        }

        for key in &ip_keys {
            let ip = pool.allocate().ok_or(VappError::IpPoolExhausted)?;
            info!("Assigned {} to {}", ip, key);
            self.set_param(key.clone(), ip.to_string());
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> PropKeys {
        let mut keys = PropKeys::default();
        for k in ["web.ip", "db.ip", "motd", "gw"] {
            keys.all.insert(k.to_string());
        }
        keys.ip.insert("web.ip".into());
        keys.ip.insert("db.ip".into());
        keys.user.insert("web.ip".into());
        keys.user.insert("db.ip".into());
        keys.user.insert("motd".into());
        keys.defaults.insert("motd".into(), "hello".into());
        keys
    }

    #[test]
    fn test_seeded_values() {
        let dp = DeployParams::new(keys());
        assert_eq!(dp.param("web.ip"), "");
        assert_eq!(dp.param("motd"), "hello");
        assert!(dp.config().contains_key("db.ip"));
        // Non-user, non-IP keys without defaults are not seeded.
        assert!(!dp.config().contains_key("gw"));
    }

    #[test]
    fn test_load_overlays_known_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.cfg");
        std::fs::write(
            &path,
            r#"<deployParameters allocationPolicy="dhcp">
  <motd> hi there </motd>
  <stale>x</stale>
</deployParameters>"#,
        )
        .unwrap();

        let mut dp = DeployParams::new(keys());
        dp.load(&path).unwrap();
        assert!(dp.is_dhcp_policy());
        assert_eq!(dp.param("motd"), "hi there");
        assert!(!dp.config().contains_key("stale"));
    }

    #[test]
    fn test_load_rejects_wrong_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.cfg");
        std::fs::write(&path, "<vapp/>").unwrap();
        let mut dp = DeployParams::new(keys());
        assert!(matches!(dp.load(&path), Err(VappError::InvalidConfig { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.cfg");
        let mut dp = DeployParams::new(keys());
        dp.load(&path).unwrap();
        dp.allocation_policy = AllocationPolicy::Transient;
        dp.set_param("web.ip", "10.0.0.5");
        dp.save().unwrap();

        let mut again = DeployParams::new(keys());
        again.load(&path).unwrap();
        assert_eq!(again.allocation_policy, AllocationPolicy::Transient);
        assert_eq!(again.param("web.ip"), "10.0.0.5");
        assert_eq!(again.param("db.ip"), "");
    }

    #[test]
    fn test_fixed_policy_requires_ip_values() {
        let mut pool = IpPool::default();
        let mut dp = DeployParams::new(keys());
        dp.set_param("web.ip", "10.0.0.5");
        let err = dp.init_ip_props(true, &mut pool).unwrap_err();
        assert!(matches!(err, VappError::MissingIpValue { ref key } if key == "db.ip"));

        dp.set_param("db.ip", "10.0.0.6");
        dp.init_ip_props(true, &mut pool).unwrap();
        assert_eq!(dp.param("web.ip"), "10.0.0.5");
    }

    #[test]
    fn test_fixed_policy_power_off_clears() {
        let mut pool = IpPool::default();
        let mut dp = DeployParams::new(keys());
        dp.set_param("web.ip", "10.0.0.5");
        dp.init_ip_props(false, &mut pool).unwrap();
        assert_eq!(dp.param("web.ip"), "");
    }

    #[test]
    fn test_transient_policy_allocates_and_releases() {
        let mut pool = IpPool::from_spec("10.0.0.1#2").unwrap();
        let mut dp = DeployParams::new(keys());
        dp.allocation_policy = AllocationPolicy::Transient;

        dp.init_ip_props(true, &mut pool).unwrap();
        let web: Ipv4Addr = dp.param("web.ip").parse().unwrap();
        let db: Ipv4Addr = dp.param("db.ip").parse().unwrap();
        assert_ne!(web, db);
        assert_eq!(pool.available_len(), 0);

        let used = [web, db].into_iter().collect();
        pool.reserve(&used);
        dp.init_ip_props(false, &mut pool).unwrap();
        assert_eq!(dp.param("web.ip"), "");
        assert_eq!(pool.available_len(), 2);
    }

    #[test]
    fn test_transient_policy_pool_exhausted() {
        let mut pool = IpPool::from_spec("10.0.0.1#1").unwrap();
        let mut dp = DeployParams::new(keys());
        dp.allocation_policy = AllocationPolicy::Transient;
        assert!(matches!(dp.init_ip_props(true, &mut pool), Err(VappError::IpPoolExhausted)));
    }

    #[test]
    fn test_dhcp_policy_leaves_ips_empty() {
        let mut pool = IpPool::from_spec("10.0.0.1#4").unwrap();
        let mut dp = DeployParams::new(keys());
        dp.allocation_policy = AllocationPolicy::Dhcp;
        dp.set_param("web.ip", "10.9.9.9");
        dp.init_ip_props(true, &mut pool).unwrap();
        assert_eq!(dp.param("web.ip"), "");
        assert_eq!(pool.available_len(), 4);
        assert!(!dp.is_user_configurable_key("web.ip"));
        assert!(dp.is_user_configurable_key("motd"));
        assert_eq!(dp.user_items(), vec![("motd", "hello")]);
    }
}

//! Workspace inventory: the entity arena and the property resolution engine.
//!
//! Entities are stored in a flat arena and refer to each other through
//! [`EntityId`] indices. Deploy parameters are owned per tree root and
//! created lazily on first access.

use crate::config::WorkspaceConfig;
use crate::deploy::{DeployParams, PropKeys};
use crate::error::{Result, VappError};
use crate::network::IpPool;
use crate::paths;
use crate::types::{Entity, EntityId, Link, PowerState};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Resolved environment of several entities, keyed by entity name.
pub type VAppEnvironment = IndexMap<String, IndexMap<String, String>>;

/// All entities of one workspace.
#[derive(Debug)]
pub struct Inventory {
    pub config: WorkspaceConfig,
    pub ip_pool: IpPool,
    entities: Vec<Entity>,
    by_name: HashMap<String, EntityId>,
    deploy: HashMap<EntityId, DeployParams>,
}

impl Inventory {
    /// An inventory with no entities.
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        let ip_pool = IpPool::from_spec(config.network.range())?;
        Ok(Self {
            config,
            ip_pool,
            entities: Vec::new(),
            by_name: HashMap::new(),
            deploy: HashMap::new(),
        })
    }

    /// Load the workspace rooted at `dir`.
    ///
    /// Every subdirectory holding an entity config becomes an entity. Links
    /// naming a parent that does not exist are dropped and the child's config
    /// is rewritten without them.
    #[instrument]
    pub fn load(dir: &Path) -> Result<Self> {
        let mut inventory = Self::new(WorkspaceConfig::load(dir)?)?;

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| VappError::io(dir, e))? {
            let entry = entry.map_err(|e| VappError::io(dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        for name in names {
            if let Some(entity) = Entity::load(&name, &dir.join(&name))? {
                inventory.insert(entity);
            }
        }
        inventory.resolve_links()?;

        info!("Loaded {} entities from {:?}", inventory.entities.len(), dir);
        Ok(inventory)
    }

    /// Add an entity without linking it. Its `link`, if any, is resolved by
    /// [`Inventory::resolve_links`].
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        self.by_name.insert(entity.name.clone(), id);
        self.entities.push(entity);
        id
    }

    /// Attach every linked entity to its parent.
    pub fn resolve_links(&mut self) -> Result<()> {
        for idx in 0..self.entities.len() {
            let child = EntityId(idx);
            if self.entities[idx].parent.is_some() {
                continue;
            }
            let Some(parent_name) = self.entities[idx].link.as_ref().map(|l| l.name.clone()) else {
                continue;
            };

            match self.by_name.get(&parent_name).copied() {
                Some(parent) if parent != child => {
                    if self.is_ancestor(child, parent) {
                        return Err(VappError::InvalidConfig {
                            path: self.entities[idx].cfg_path(),
                            reason: format!(
                                "link to '{}' makes '{}' its own ancestor",
                                parent_name, self.entities[idx].name
                            ),
                        });
                    }
                    self.entities[idx].parent = Some(parent);
                    self.entities[parent.0].children.push(child);
                }
                _ => {
                    warn!(
                        "{}: parent '{}' does not exist, removing link",
                        self.entities[idx].name, parent_name
                    );
                    self.unset_parent(child);
                    self.entities[idx].save()?;
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Like [`Inventory::lookup`], failing with `EntityNotFound`.
    pub fn find(&self, name: &str) -> Result<EntityId> {
        self.lookup(name).ok_or_else(|| VappError::EntityNotFound { name: name.to_string() })
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    /// All entity ids, in load order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.entities.len()).map(EntityId)
    }

    /// Entities without a parent.
    pub fn roots(&self) -> Vec<EntityId> {
        self.ids().filter(|id| self.entity(*id).parent.is_none()).collect()
    }

    /// Whether `ancestor` is `id` or lies on its parent chain.
    fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.entity(c).parent;
        }
        false
    }

    pub fn root_of(&self, id: EntityId) -> EntityId {
        let mut cur = id;
        while let Some(parent) = self.entity(cur).parent {
            cur = parent;
        }
        cur
    }

    /// Link `child` under `parent` with a default link. No-op when already
    /// linked to that parent.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) {
        if self.entity(child).parent == Some(parent) {
            return;
        }
        self.unset_parent(child);

        let parent_name = self.entity(parent).name.clone();
        let entity = self.entity_mut(child);
        entity.link = Some(Link::new(parent_name));
        entity.parent = Some(parent);
        self.entity_mut(parent).children.push(child);
    }

    /// Detach `child` from its parent and drop its link.
    pub fn unset_parent(&mut self, child: EntityId) {
        if let Some(parent) = self.entity(child).parent {
            self.entity_mut(parent).children.retain(|c| *c != child);
        }
        let entity = self.entity_mut(child);
        entity.parent = None;
        entity.link = None;
    }

    /// Children in ascending start order. Reverse it for stop order.
    pub fn children_by_start_order(&self, id: EntityId) -> Vec<EntityId> {
        let mut children = self.entity(id).children.clone();
        children.sort_by_key(|c| {
            self.entity(*c).link.as_ref().map(|l| l.start_order).unwrap_or(u32::MAX)
        });
        children
    }

    /// Property keys across the whole subtree of `id`.
    ///
    /// Defaults come from literal properties only. An entity's own defaults
    /// win over those of its descendants.
    pub fn prop_keys(&self, id: EntityId) -> PropKeys {
        let entity = self.entity(id);
        let mut keys = PropKeys::default();

        for child in &entity.children {
            keys.merge(self.prop_keys(*child));
        }
        for p in &entity.properties {
            keys.all.insert(p.key.clone());
            if p.is_ip() {
                keys.ip.insert(p.key.clone());
            }
            if p.is_user_configurable() {
                keys.user.insert(p.key.clone());
            }
            if !p.is_macro() && !p.value.is_empty() {
                keys.defaults.insert(p.key.clone(), p.value.clone());
            }
        }
        keys
    }

    /// Load the deploy parameters of the tree containing `id` if needed.
    /// Returns the tree root.
    ///
    /// The file is rewritten right after loading since the key set may have
    /// changed since the last run.
    fn ensure_deploy_params(&mut self, id: EntityId) -> Result<EntityId> {
        let root = self.root_of(id);
        if !self.deploy.contains_key(&root) {
            let mut dp = DeployParams::new(self.prop_keys(root));
            dp.load(&paths::deploy_cfg_path(&self.entity(root).dir))?;
            dp.save()?;
            self.deploy.insert(root, dp);
        }
        Ok(root)
    }

    /// Deploy parameters shared by the tree containing `id`.
    pub fn deploy_params(&mut self, id: EntityId) -> Result<&mut DeployParams> {
        let root = self.ensure_deploy_params(id)?;
        self.deploy
            .get_mut(&root)
            .ok_or_else(|| VappError::Internal(format!("deploy parameters missing for {:?}", root)))
    }

    /// Resolve the environment of `id`, computing its ancestors first.
    ///
    /// A VM starts from a copy of its parent's environment; a vApp only sees
    /// its own properties.
    pub fn compute_ovf_env_props(&mut self, id: EntityId) -> Result<()> {
        let deploy = self.deploy_params(id)?.config().clone();

        let mut parent_env = IndexMap::new();
        let mut props = IndexMap::new();
        if let Some(parent) = self.entity(id).parent {
            self.compute_ovf_env_props(parent)?;
            parent_env = self.entity(parent).ovf_env_props.clone().unwrap_or_default();
            if self.entity(id).is_vm() {
                props = parent_env.clone();
            }
        }

        for p in &self.entity(id).properties {
            let value = p.effective_value(&deploy, &parent_env, &self.config.network)?;
            props.insert(p.key.clone(), value);
        }
        self.entity_mut(id).ovf_env_props = Some(props);
        Ok(())
    }

    /// Environment handed to the VM `id`: itself when it is a root, otherwise
    /// every member of its vApp. Members not resolved yet are resolved first.
    pub fn vapp_environment(&mut self, id: EntityId) -> Result<VAppEnvironment> {
        let members = match self.entity(id).parent {
            None => vec![id],
            Some(parent) => self.entity(parent).children.clone(),
        };

        let mut env = VAppEnvironment::new();
        for member in members {
            if self.entity(member).ovf_env_props.is_none() {
                self.compute_ovf_env_props(member)?;
            }
            let entity = self.entity(member);
            env.insert(entity.name.clone(), entity.ovf_env_props.clone().unwrap_or_default());
        }
        Ok(env)
    }

    /// Addresses held by `id`.
    ///
    /// A powered-off entity under a pool-backed or DHCP policy holds none.
    /// Values that are not IPv4 addresses are ignored.
    pub fn used_ips(&mut self, id: EntityId) -> Result<HashSet<Ipv4Addr>> {
        let root = self.ensure_deploy_params(id)?;
        let dp = &self.deploy[&root];
        let entity = &self.entities[id.0];

        if entity.state == PowerState::PoweredOff && !dp.is_fixed_policy() {
            return Ok(HashSet::new());
        }

        let mut used = HashSet::new();
        for p in entity.properties.iter().filter(|p| p.is_ip()) {
            let value = match dp.param(&p.key) {
                "" => p.value.as_str(),
                v => v,
            };
            if let Ok(ip) = value.trim().parse::<Ipv4Addr>() {
                used.insert(ip);
            }
        }
        Ok(used)
    }

    /// Write a guest-reported address into the property that supplies it.
    ///
    /// The first IP property with an empty value wins. When `id` has none,
    /// the walk moves to the parent restricted to the keys `id` forwards
    /// through `${name}` macros. Returns the key written, if any.
    #[instrument(skip(self))]
    pub fn propagate_ip(&mut self, id: EntityId, ip: &str) -> Result<Option<String>> {
        let empty = IndexMap::new();
        let mut keys_in: HashSet<String> = HashSet::new();
        let mut current = Some(id);

        while let Some(cur) = current {
            let root = self.ensure_deploy_params(cur)?;
            let deploy = self.deploy[&root].config();

            let mut keys_out = HashSet::new();
            let mut target = None;
            for p in &self.entity(cur).properties {
                if p.is_ip() && (keys_in.is_empty() || keys_in.contains(&p.key)) {
                    if p.effective_value(deploy, &empty, &self.config.network)?.is_empty() {
                        target = Some(p.key.clone());
                        break;
                    }
                } else if let Some(assignee) = p.assignee() {
                    keys_out.insert(assignee.to_string());
                }
            }

            if let Some(key) = target {
                let dp = self.deploy_params(cur)?;
                dp.set_param(key.clone(), ip);
                dp.save()?;
                info!("Propagated {} to {}", ip, key);
                return Ok(Some(key));
            }
            if keys_out.is_empty() {
                break;
            }
            keys_in = keys_out;
            current = self.entity(cur).parent;
        }

        debug!("No property takes address {}", ip);
        Ok(None)
    }

    /// Whether `id` or any ancestor is powered on.
    pub fn in_running_vapp(&self, id: EntityId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.entity(c).is_powered_on() {
                return true;
            }
            cur = self.entity(c).parent;
        }
        false
    }

    /// Initialise IP properties for a power transition, unless the entity
    /// sits in a tree that is still running.
    pub fn setup_ip_properties(&mut self, id: EntityId, power_on: bool) -> Result<()> {
        if self.in_running_vapp(id) {
            debug!("{} is in a running vApp, keeping IP properties", self.entity(id).name);
            return Ok(());
        }
        let root = self.ensure_deploy_params(id)?;
        let dp = self
            .deploy
            .get_mut(&root)
            .ok_or_else(|| VappError::Internal(format!("deploy parameters missing for {:?}", root)))?;
        dp.init_ip_props(power_on, &mut self.ip_pool)
    }

    /// Take every address in use by any entity out of the pool.
    /// Power state must be known first.
    pub fn reserve_used_ips(&mut self) -> Result<()> {
        let ids: Vec<EntityId> = self.ids().collect();
        for id in ids {
            let used = self.used_ips(id)?;
            self.ip_pool.reserve(&used);
        }
        Ok(())
    }

    /// `appUrl` with `${key}` placeholders replaced from the deploy
    /// parameters. Empty when a referenced key has no value.
    pub fn expanded_app_url(&mut self, id: EntityId) -> Result<String> {
        let template = self.entity(id).app_url.clone();
        let config = self.deploy_params(id)?.config();

        let mut url = template.clone();
        for (key, value) in config {
            let placeholder = format!("${{{}}}", key);
            if template.contains(&placeholder) {
                if value.is_empty() {
                    return Ok(String::new());
                }
                url = url.replace(&placeholder, value);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::AllocationPolicy;
    use crate::types::Property;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        WorkspaceConfig::create_default(dir.path()).unwrap();
        dir
    }

    fn write_entity(ws: &Path, name: &str, file: &str, body: &str) {
        let dir = ws.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
    }

    /// One vApp with a web and a db VM. The vApp owns the IP properties, the
    /// VMs read them through macros.
    fn two_tier(ws: &Path) {
        write_entity(
            ws,
            "app",
            paths::VAPP_CFG_NAME,
            r#"<vapp appUrl="http://${web.ip}/">
  <property key="web.ip" type="ip:Network" value=""/>
  <property key="db.ip" type="ip:Network" value=""/>
  <property key="motd" type="string" value="hi"/>
</vapp>"#,
        );
        write_entity(
            ws,
            "web",
            paths::VM_CFG_NAME,
            r#"<vm transport="iso">
  <link name="app" startOrder="20"/>
  <property key="ip" type="expression" value="${web.ip}"/>
  <property key="gw" type="expression" value="${gateway:Network}"/>
  <vmx file="web.vmx"/>
</vm>"#,
        );
        write_entity(
            ws,
            "db",
            paths::VM_CFG_NAME,
            r#"<vm transport="iso">
  <link name="app" startOrder="10"/>
  <property key="ip" type="expression" value="${db.ip}"/>
  <vmx file="db.vmx"/>
</vm>"#,
        );
    }

    #[test]
    fn test_load_links_children() {
        let ws = workspace();
        two_tier(ws.path());
        let inv = Inventory::load(ws.path()).unwrap();

        let app = inv.find("app").unwrap();
        assert_eq!(inv.roots(), vec![app]);
        let order: Vec<&str> =
            inv.children_by_start_order(app).iter().map(|c| inv.entity(*c).name.as_str()).collect();
        assert_eq!(order, vec!["db", "web"]);
        assert_eq!(inv.root_of(inv.find("web").unwrap()), app);
    }

    #[test]
    fn test_dangling_link_is_removed() {
        let ws = workspace();
        write_entity(
            ws.path(),
            "orphan",
            paths::VM_CFG_NAME,
            r#"<vm><link name="gone"/><vmx file="o.vmx"/></vm>"#,
        );
        let inv = Inventory::load(ws.path()).unwrap();
        let orphan = inv.find("orphan").unwrap();
        assert!(inv.entity(orphan).link.is_none());

        let reloaded = Entity::load("orphan", &ws.path().join("orphan")).unwrap().unwrap();
        assert!(reloaded.link.is_none());
    }

    #[test]
    fn test_link_cycle_is_rejected() {
        let ws = workspace();
        write_entity(ws.path(), "a", paths::VAPP_CFG_NAME, r#"<vapp><link name="b"/></vapp>"#);
        write_entity(ws.path(), "b", paths::VAPP_CFG_NAME, r#"<vapp><link name="a"/></vapp>"#);

        match Inventory::load(ws.path()) {
            Err(VappError::InvalidConfig { reason, .. }) => assert!(reason.contains("own ancestor")),
            other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_longer_link_cycle_is_rejected() {
        let ws = workspace();
        write_entity(ws.path(), "a", paths::VAPP_CFG_NAME, r#"<vapp><link name="c"/></vapp>"#);
        write_entity(ws.path(), "b", paths::VAPP_CFG_NAME, r#"<vapp><link name="a"/></vapp>"#);
        write_entity(ws.path(), "c", paths::VAPP_CFG_NAME, r#"<vapp><link name="b"/></vapp>"#);
        assert!(matches!(Inventory::load(ws.path()), Err(VappError::InvalidConfig { .. })));
    }

    #[test]
    fn test_set_and_unset_parent() {
        let ws = workspace();
        let mut inv = Inventory::new(WorkspaceConfig::load(ws.path()).unwrap()).unwrap();
        let a = inv.insert(Entity::vapp("a", ws.path().join("a")));
        let b = inv.insert(Entity::vapp("b", ws.path().join("b")));
        let vm = inv.insert(Entity::vm("vm", ws.path().join("vm"), "vm.vmx"));

        inv.set_parent(vm, a);
        inv.set_parent(vm, a);
        assert_eq!(inv.entity(a).children, vec![vm]);

        inv.set_parent(vm, b);
        assert!(inv.entity(a).children.is_empty());
        assert_eq!(inv.entity(b).children, vec![vm]);
        assert_eq!(inv.entity(vm).link.as_ref().unwrap().name, "b");
        assert_eq!(inv.entity(vm).link.as_ref().unwrap().start_order, 30);

        inv.unset_parent(vm);
        assert!(inv.entity(b).children.is_empty());
        assert!(inv.entity(vm).link.is_none());
    }

    #[test]
    fn test_start_and_stop_order() {
        let ws = workspace();
        let mut inv = Inventory::new(WorkspaceConfig::load(ws.path()).unwrap()).unwrap();
        let app = inv.insert(Entity::vapp("app", ws.path().join("app")));
        for (name, order) in [("a", 10), ("b", 5), ("c", 20)] {
            let id = inv.insert(Entity::vm(name, ws.path().join(name), "x.vmx"));
            inv.set_parent(id, app);
            inv.entity_mut(id).link.as_mut().unwrap().start_order = order;
        }

        let start: Vec<u32> = inv
            .children_by_start_order(app)
            .iter()
            .map(|c| inv.entity(*c).link.as_ref().unwrap().start_order)
            .collect();
        assert_eq!(start, vec![5, 10, 20]);

        let mut stop = start.clone();
        stop.reverse();
        assert_eq!(stop, vec![20, 10, 5]);
    }

    #[test]
    fn test_prop_keys_cover_subtree() {
        let ws = workspace();
        two_tier(ws.path());
        let inv = Inventory::load(ws.path()).unwrap();
        let keys = inv.prop_keys(inv.find("app").unwrap());

        for k in ["web.ip", "db.ip", "motd", "ip", "gw"] {
            assert!(keys.all.contains(k), "missing {}", k);
        }
        assert!(keys.ip.contains("web.ip") && keys.ip.contains("db.ip"));
        assert!(!keys.user.contains("ip"));
        assert_eq!(keys.defaults.get("motd").map(String::as_str), Some("hi"));
        assert!(!keys.defaults.contains_key("ip"));
    }

    #[test]
    fn test_deploy_params_written_on_first_access() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let web = inv.find("web").unwrap();

        inv.deploy_params(web).unwrap().set_param("motd", "changed");
        let app = inv.find("app").unwrap();
        assert_eq!(inv.deploy_params(app).unwrap().param("motd"), "changed");
        let file = paths::deploy_cfg_path(&ws.path().join("app"));
        assert!(file.is_file());
        assert_eq!(inv.deploy_params(app).unwrap().file(), Some(file.as_path()));
        assert!(!paths::deploy_cfg_path(&ws.path().join("web")).exists());
    }

    #[test]
    fn test_compute_ovf_env_props_inherits_parent() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let web = inv.find("web").unwrap();
        inv.deploy_params(web).unwrap().set_param("web.ip", "10.0.0.7");

        inv.compute_ovf_env_props(web).unwrap();
        let props = inv.entity(web).ovf_env_props.clone().unwrap();
        assert_eq!(props.get("ip").map(String::as_str), Some("10.0.0.7"));
        assert_eq!(props.get("gw").map(String::as_str), Some("192.168.0.1"));
        // Inherited from the vApp.
        assert_eq!(props.get("motd").map(String::as_str), Some("hi"));

        let app = inv.find("app").unwrap();
        let app_props = inv.entity(app).ovf_env_props.clone().unwrap();
        assert!(!app_props.contains_key("ip"));
    }

    #[test]
    fn test_vapp_environment_lists_siblings() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let env = inv.vapp_environment(inv.find("web").unwrap()).unwrap();
        let names: Vec<&str> = env.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["db", "web"]);
    }

    #[test]
    fn test_undefined_reference_fails() {
        let ws = workspace();
        let mut inv = Inventory::new(WorkspaceConfig::load(ws.path()).unwrap()).unwrap();
        let app = inv.insert(Entity::vapp("app", ws.path().join("app")));
        fs::create_dir_all(ws.path().join("app")).unwrap();
        let vm = inv.insert(Entity::vm("vm", ws.path().join("vm"), "vm.vmx"));
        inv.set_parent(vm, app);
        inv.entity_mut(vm).properties.push(Property::new("ip", "expression", "${nope}", false));

        let err = inv.compute_ovf_env_props(vm).unwrap_err();
        assert!(matches!(err, VappError::UndefinedReference { .. }));
    }

    #[test]
    fn test_propagate_ip_walks_to_parent() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let web = inv.find("web").unwrap();

        let key = inv.propagate_ip(web, "10.1.1.1").unwrap();
        assert_eq!(key.as_deref(), Some("web.ip"));
        assert_eq!(inv.deploy_params(web).unwrap().param("web.ip"), "10.1.1.1");
        assert_eq!(inv.deploy_params(web).unwrap().param("db.ip"), "");

        // Already set: nothing left to write.
        assert_eq!(inv.propagate_ip(web, "10.1.1.2").unwrap(), None);
    }

    #[test]
    fn test_propagate_ip_follows_forwarded_key() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let db = inv.find("db").unwrap();

        // web.ip comes first on the vApp but db only forwards db.ip.
        let key = inv.propagate_ip(db, "10.9.9.9").unwrap();
        assert_eq!(key.as_deref(), Some("db.ip"));
        assert_eq!(inv.deploy_params(db).unwrap().param("db.ip"), "10.9.9.9");
        assert_eq!(inv.deploy_params(db).unwrap().param("web.ip"), "");
    }

    #[test]
    fn test_used_ips_fall_back_to_static_default() {
        let ws = workspace();
        write_entity(
            ws.path(),
            "app",
            paths::VAPP_CFG_NAME,
            r#"<vapp>
  <property key="web.ip" type="ip:Network" value="192.168.0.203"/>
</vapp>"#,
        );
        let mut inv = Inventory::load(ws.path()).unwrap();
        let app = inv.find("app").unwrap();
        inv.deploy_params(app).unwrap().set_param("web.ip", "");
        inv.entity_mut(app).state = PowerState::PoweredOff;

        let used = inv.used_ips(app).unwrap();
        let addr: Ipv4Addr = "192.168.0.203".parse().unwrap();
        assert_eq!(used, HashSet::from([addr]));

        inv.reserve_used_ips().unwrap();
        assert!(!inv.ip_pool.is_available(addr));
        assert!(inv.ip_pool.is_reserved(addr));
    }

    #[test]
    fn test_used_ips_by_policy() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let app = inv.find("app").unwrap();
        inv.deploy_params(app).unwrap().set_param("web.ip", "192.168.0.201");

        inv.entity_mut(app).state = PowerState::PoweredOff;
        assert_eq!(inv.used_ips(app).unwrap().len(), 1);

        inv.deploy_params(app).unwrap().allocation_policy = AllocationPolicy::Transient;
        assert!(inv.used_ips(app).unwrap().is_empty());

        inv.entity_mut(app).state = PowerState::PoweredOn;
        assert_eq!(inv.used_ips(app).unwrap().len(), 1);

        inv.reserve_used_ips().unwrap();
        assert!(!inv.ip_pool.is_available("192.168.0.201".parse().unwrap()));
        assert!(inv.ip_pool.is_reserved("192.168.0.201".parse().unwrap()));
    }

    #[test]
    fn test_setup_ip_properties_skips_running_tree() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let app = inv.find("app").unwrap();
        let web = inv.find("web").unwrap();
        inv.deploy_params(app).unwrap().allocation_policy = AllocationPolicy::Transient;

        inv.entity_mut(app).state = PowerState::PoweredOn;
        assert!(inv.in_running_vapp(web));
        inv.setup_ip_properties(web, true).unwrap();
        assert_eq!(inv.deploy_params(app).unwrap().param("web.ip"), "");

        inv.entity_mut(app).state = PowerState::PoweredOff;
        inv.setup_ip_properties(app, true).unwrap();
        assert_eq!(inv.deploy_params(app).unwrap().param("web.ip"), "192.168.0.200");
        assert_eq!(inv.deploy_params(app).unwrap().param("db.ip"), "192.168.0.201");
    }

    #[test]
    fn test_expanded_app_url() {
        let ws = workspace();
        two_tier(ws.path());
        let mut inv = Inventory::load(ws.path()).unwrap();
        let app = inv.find("app").unwrap();
        assert_eq!(inv.expanded_app_url(app).unwrap(), "");

        inv.deploy_params(app).unwrap().set_param("web.ip", "10.0.0.2");
        assert_eq!(inv.expanded_app_url(app).unwrap(), "http://10.0.0.2/");
    }
}

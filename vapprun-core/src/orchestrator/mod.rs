//! Lifecycle orchestration over the entity tree.
//!
//! The orchestrator owns the inventory for one invocation and processes one
//! entity at a time. The only suspension points are backend calls and the
//! post-start poll loop.

use crate::adapters::{sanitize_address, ControlBackend, IsoBuilder};
use crate::config::RunOptions;
use crate::error::{Result, VappError};
use crate::inventory::Inventory;
use crate::types::{EntityId, PowerState};
use std::sync::Arc;
use tracing::{debug, info, instrument};

mod lifecycle;

/// Drives start/stop over an [`Inventory`].
pub struct Orchestrator {
    inventory: Inventory,
    backend: Arc<dyn ControlBackend>,
    iso: Arc<dyn IsoBuilder>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        inventory: Inventory,
        backend: Arc<dyn ControlBackend>,
        iso: Arc<dyn IsoBuilder>,
        options: RunOptions,
    ) -> Self {
        Self { inventory, backend, iso, options }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Query the power state of every tree, then reserve the addresses
    /// running entities hold.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<()> {
        for root in self.inventory.roots() {
            self.init_power_state(root).await?;
        }
        self.inventory.reserve_used_ips()?;
        debug!(available = self.inventory.ip_pool.available_len(), "Power state refreshed");
        Ok(())
    }

    /// Query and record the power state of `id`.
    ///
    /// A vApp is powered on when any child is.
    pub async fn init_power_state(&mut self, id: EntityId) -> Result<PowerState> {
        let state = if self.inventory.entity(id).is_vm() {
            let handle = self
                .inventory
                .entity(id)
                .vm_handle()
                .ok_or_else(|| VappError::Internal(format!("{:?} is not a VM", id)))?;
            let (state, raw) = self.backend.query_power_state(&handle).await?;
            let ip = sanitize_address(&raw);
            // An error report means the VM is not running, whatever the backend said.
            let state = if ip.is_empty() && raw.to_lowercase().contains("error") {
                PowerState::PoweredOff
            } else {
                state
            };
            self.inventory.entity_mut(id).ip = ip;
            state
        } else {
            let mut state = PowerState::PoweredOff;
            for child in self.inventory.entity(id).children.clone() {
                if Box::pin(self.init_power_state(child)).await? == PowerState::PoweredOn {
                    state = PowerState::PoweredOn;
                }
            }
            self.inventory.entity_mut(id).ip.clear();
            state
        };

        self.inventory.entity_mut(id).state = state;
        Ok(state)
    }

    /// Log every resolved property of `id` when verbose.
    fn show_ovf_env_props(&self, id: EntityId) {
        if !self.options.verbose {
            return;
        }
        let entity = self.inventory.entity(id);
        for (key, value) in entity.ovf_env_props.iter().flatten() {
            info!(entity = %entity.name, "[{} = {}]", key, value);
        }
    }
}

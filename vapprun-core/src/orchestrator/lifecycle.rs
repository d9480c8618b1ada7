//! Start/stop state machine.
//!
//! Start walks children in ascending `startOrder`, stop in descending order.
//! A stop cascade never aborts on a child: failures are logged and the
//! remaining siblings are still stopped.

use super::Orchestrator;
use crate::adapters::sanitize_address;
use crate::error::{Result, VappError};
use crate::observability::metrics;
use crate::ovfenv::OvfEnv;
use crate::types::{EntityId, PowerState};
use crate::vmx;
use tracing::{debug, info, instrument, warn};

impl Orchestrator {
    /// Power on `id` and everything below it.
    ///
    /// Fails with `AlreadyRunning` when it is on already.
    #[instrument(skip(self), fields(entity = %self.inventory.entity(id).name))]
    pub async fn start_action(&mut self, id: EntityId) -> Result<()> {
        if self.init_power_state(id).await? == PowerState::PoweredOn {
            return Err(VappError::AlreadyRunning { name: self.inventory.entity(id).name.clone() });
        }

        self.inventory.setup_ip_properties(id, true)?;
        self.start_child(id).await
    }

    /// Power off `id` and everything below it, hard when `force` is set.
    ///
    /// With `silent` an entity that is already off is skipped quietly,
    /// otherwise that is reported as `AlreadyStopped`.
    #[instrument(skip(self), fields(entity = %self.inventory.entity(id).name))]
    pub async fn stop_action(&mut self, id: EntityId, force: bool, silent: bool) -> Result<()> {
        let name = self.inventory.entity(id).name.clone();
        if self.init_power_state(id).await? == PowerState::PoweredOff {
            if silent {
                debug!("{} is already stopped", name);
                return Ok(());
            }
            return Err(VappError::AlreadyStopped { name });
        }

        if force {
            info!("Shutting down {}", name);
        } else {
            info!("Stopping {}", name);
        }

        if self.inventory.entity(id).is_vm() {
            self.stop_vm(id, force).await
        } else {
            self.stop_vapp(id, force).await
        }
    }

    /// Hard stop that never reports an entity being off already.
    pub async fn shutdown_action(&mut self, id: EntityId) -> Result<()> {
        self.stop_action(id, true, true).await
    }

    async fn start_child(&mut self, id: EntityId) -> Result<()> {
        if self.inventory.entity(id).is_vm() {
            self.start_vm(id).await
        } else {
            self.start_vapp(id).await
        }
    }

    async fn start_vapp(&mut self, id: EntityId) -> Result<()> {
        // Each member's document lists every sibling, so resolve them all first.
        self.inventory.compute_ovf_env_props(id)?;
        for child in self.inventory.entity(id).children.clone() {
            self.inventory.compute_ovf_env_props(child)?;
        }

        info!("Starting {}", self.inventory.entity(id).name);
        self.show_ovf_env_props(id);

        for child in self.inventory.children_by_start_order(id) {
            Box::pin(self.start_child(child)).await?;
        }
        Ok(())
    }

    async fn start_vm(&mut self, id: EntityId) -> Result<()> {
        self.inventory.compute_ovf_env_props(id)?;
        let env = self.inventory.vapp_environment(id)?;

        let entity = self.inventory.entity(id);
        let name = entity.name.clone();
        let link = entity.link.clone();
        let (handle, section) = match (entity.vm_handle(), entity.vm_section()) {
            (Some(h), Some(s)) => (h, s.clone()),
            _ => return Err(VappError::Internal(format!("{} is not a VM", name))),
        };

        let ovf_env = OvfEnv::new(name.clone(), env);
        vmx::publish_environment(&section.vmx_path, &ovf_env, section.transports(), self.iso.as_ref())
            .await?;

        info!("Starting {}", name);
        self.show_ovf_env_props(id);

        if self.options.dry_run {
            return Ok(());
        }

        self.backend.power_on(&handle).await?;
        metrics::record_vm_started(self.backend.name());

        // A VM outside any vApp has nothing to wait for.
        let Some(link) = link else {
            return Ok(());
        };

        for waited in 0..link.start_wait {
            tokio::time::sleep(self.options.poll_interval).await;
            if waited % 10 == 0 {
                let remaining = self.options.poll_interval * (link.start_wait - waited);
                info!("Waiting for {:?}...", remaining);
            }
            if !link.wait_for_tools {
                continue;
            }

            let ip = sanitize_address(&self.backend.query_address(&handle).await?);
            if ip.is_empty() {
                continue;
            }
            info!(ip = %ip, "{} reported an address", name);
            self.inventory.entity_mut(id).ip = ip.clone();
            if self.inventory.deploy_params(id)?.is_dhcp_policy()
                && self.inventory.propagate_ip(id, &ip)?.is_some()
            {
                metrics::record_ip_propagated();
            }
            return Ok(());
        }

        debug!("{} did not report an address within {} steps", name, link.start_wait);
        Ok(())
    }

    async fn stop_vm(&mut self, id: EntityId, force: bool) -> Result<()> {
        if self.options.dry_run {
            return Ok(());
        }

        let entity = self.inventory.entity(id);
        let (handle, section) = match (entity.vm_handle(), entity.vm_section()) {
            (Some(h), Some(s)) => (h, s.clone()),
            _ => return Err(VappError::Internal(format!("{} is not a VM", entity.name))),
        };

        self.backend.power_off(&handle, force).await?;
        metrics::record_vm_stopped(force);

        self.init_power_state(id).await?;
        self.inventory.setup_ip_properties(id, false)?;

        // Leave the drive disconnected so the VM exports cleanly.
        vmx::disconnect_ovf_iso(&section.vmx_path, section.transports())
    }

    async fn stop_vapp(&mut self, id: EntityId, force: bool) -> Result<()> {
        let mut order = self.inventory.children_by_start_order(id);
        order.reverse();

        for child in order {
            if let Err(e) = Box::pin(self.stop_action(child, force, true)).await {
                warn!(error = %e, "Failed to stop {}", self.inventory.entity(child).name);
            }
        }

        self.init_power_state(id).await?;
        self.inventory.setup_ip_properties(id, false)
    }
}

//! `vmrun` control backend (VMware Workstation / Fusion).
//!
//! - Power on: `vmrun start <vmx> gui|nogui`
//! - Power off: `vmrun stop <vmx> hard|soft`
//! - Observe: `vmrun readVariable <vmx> runtimeConfig guestinfo.ip`

use crate::adapters::{sanitize_address, ControlBackend};
use crate::error::{Result, VappError};
use crate::types::{PowerState, VmHandle};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Runtime variable the guest tools publish the primary address under.
const GUEST_IP_VARIABLE: &str = "guestinfo.ip";

/// Control backend shelling out to `vmrun`.
pub struct VmrunBackend {
    binary_path: PathBuf,
    gui: bool,
}

impl VmrunBackend {
    pub fn new(binary_path: impl Into<PathBuf>, gui: bool) -> Self {
        Self { binary_path: binary_path.into(), gui }
    }

    fn command_name(&self) -> String {
        self.binary_path.display().to_string()
    }

    async fn run(&self, args: &[&str], vm: &VmHandle) -> Result<Output> {
        debug!("Running {} {:?} on {:?}", self.command_name(), args, vm.vmx_path);
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg(args[0]).arg(&vm.vmx_path).args(&args[1..]);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());

        cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VappError::CommandNotFound { command: self.command_name() },
            _ => VappError::CommandFailed { command: self.command_name(), reason: e.to_string() },
        })
    }

    async fn run_checked(&self, args: &[&str], vm: &VmHandle) -> Result<()> {
        let output = self.run(args, vm).await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(VappError::CommandFailed {
                command: format!("{} {}", self.command_name(), args[0]),
                reason: format!("{} ({})", stdout.trim(), output.status),
            });
        }
        Ok(())
    }

    /// Raw `guestinfo.ip` output, lower-cased and trimmed.
    async fn read_guest_ip(&self, vm: &VmHandle) -> Result<String> {
        let output = self.run(&["readVariable", "runtimeConfig", GUEST_IP_VARIABLE], vm).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_lowercase())
    }
}

#[async_trait]
impl ControlBackend for VmrunBackend {
    #[instrument(skip(self), fields(vm = %vm.name))]
    async fn power_on(&self, vm: &VmHandle) -> Result<()> {
        let mode = if self.gui { "gui" } else { "nogui" };
        self.run_checked(&["start", mode], vm).await?;
        info!("Powered on");
        Ok(())
    }

    #[instrument(skip(self), fields(vm = %vm.name))]
    async fn power_off(&self, vm: &VmHandle, hard: bool) -> Result<()> {
        let mode = if hard { "hard" } else { "soft" };
        self.run_checked(&["stop", mode], vm).await?;
        info!("Powered off");
        Ok(())
    }

    async fn query_address(&self, vm: &VmHandle) -> Result<String> {
        Ok(sanitize_address(&self.read_guest_ip(vm).await?))
    }

    async fn query_power_state(&self, vm: &VmHandle) -> Result<(PowerState, String)> {
        let out = self.read_guest_ip(vm).await?;
        if out.contains("error") {
            return Ok((PowerState::PoweredOff, String::new()));
        }
        Ok((PowerState::PoweredOn, out))
    }

    fn name(&self) -> &str {
        "vmrun"
    }
}

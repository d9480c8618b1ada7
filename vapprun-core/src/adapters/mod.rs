//! External collaborator abstraction.
//!
//! vapprun drives VMs through two seams:
//! - [`ControlBackend`]: power transitions and guest observation (`vmrun`)
//! - [`IsoBuilder`]: environment image creation (`mkisofs`)
//!
//! [`AdapterFactory`] locates the tools on the host and builds both.

use crate::error::Result;
use crate::types::{PowerState, VmHandle};
use async_trait::async_trait;
use std::path::Path;

/// Hypervisor control channel.
///
/// Every method is a single opaque call; the orchestrator does the ordering
/// and waiting.
#[async_trait]
pub trait ControlBackend: Send + Sync {
    /// Power the VM on. Returns once the request is accepted.
    async fn power_on(&self, vm: &VmHandle) -> Result<()>;

    /// Power the VM off, hard (immediate) or soft (guest shutdown).
    async fn power_off(&self, vm: &VmHandle, hard: bool) -> Result<()>;

    /// Address reported by the guest. Empty while the guest is booting.
    async fn query_address(&self, vm: &VmHandle) -> Result<String>;

    /// Power state plus the reported address (possibly empty).
    async fn query_power_state(&self, vm: &VmHandle) -> Result<(PowerState, String)>;

    /// Backend name (for logging).
    fn name(&self) -> &str;
}

/// Environment image creation.
#[async_trait]
pub trait IsoBuilder: Send + Sync {
    /// Write an ISO 9660 image to `target` holding a single `ovf-env.xml`
    /// with `document` as its content.
    async fn build(&self, document: &str, target: &Path) -> Result<()>;
}

/// Normalise a backend-reported address.
///
/// Anything mentioning `error` means the VM is not running and is discarded.
pub fn sanitize_address(raw: &str) -> String {
    let addr = raw.trim().to_lowercase();
    if addr.contains("error") {
        return String::new();
    }
    addr
}

mod factory;
mod mkisofs;
mod vmrun;

pub use factory::AdapterFactory;
pub use mkisofs::MkisofsBuilder;
pub use vmrun::VmrunBackend;

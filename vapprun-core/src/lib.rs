//! vapprun core library.
//!
//! Workspace inventory, property resolution, IP pool, environment documents
//! and the dependency-ordered start/stop lifecycle of local vApps.

pub mod adapters;
pub mod config;
pub mod deploy;
pub mod error;
pub mod inventory;
pub mod network;
pub mod observability;
pub mod orchestrator;
pub mod ovfenv;
pub mod paths;
pub mod types;
pub mod vmx;
pub mod xml;

// Re-export commonly used items
pub use adapters::{AdapterFactory, ControlBackend, IsoBuilder};
pub use config::{RunOptions, WorkspaceConfig};
pub use deploy::{AllocationPolicy, DeployParams};
pub use error::{Result, VappError};
pub use inventory::Inventory;
pub use network::IpPool;
pub use observability::init as init_observability;
pub use orchestrator::Orchestrator;
pub use ovfenv::OvfEnv;
pub use types::{Entity, EntityId, EntityKind, Link, PowerState, Property, VmHandle};

//! Core domain types for vapprun.

pub mod entity;
pub mod link;
pub mod property;

// Re-exports
pub use entity::{Entity, EntityId, EntityKind, PowerState, TransportSet, VmHandle, VmSection};
pub use link::Link;
pub use property::{Macro, Property};

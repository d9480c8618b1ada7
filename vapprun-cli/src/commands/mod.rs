//! CLI command implementations

pub mod list;
pub mod power;
pub mod workspace;

pub use list::list;
pub use power::{shutdown, start, stop};
pub use workspace::init;

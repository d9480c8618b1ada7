//! Workspace networking: the IP address pool backing transient addressing.

pub mod ippool;

pub use ippool::IpPool;

//! IP address pool for transient addressing.
//!
//! The pool is built from the workspace `range` setting (`A.B.C.D#N`) and
//! lives in memory for one invocation. Addresses already used by running
//! entities are reserved at startup so they are not handed out twice.

use crate::error::{Result, VappError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use tracing::{debug, info, instrument};

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})#(\d{1,3})$")
        .expect("static regex is valid")
});

/// Pool of available addresses plus the addresses reserved from it.
#[derive(Debug, Clone, Default)]
pub struct IpPool {
    available: BTreeSet<Ipv4Addr>,
    reserved: Vec<Ipv4Addr>,
}

impl IpPool {
    /// Create a pool holding exactly `addresses`.
    pub fn new(addresses: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self { available: addresses.into_iter().collect(), reserved: Vec::new() }
    }

    /// Build a pool from a range specification such as `192.168.0.200#8`.
    ///
    /// An empty specification, or one whose octets are out of range, yields an
    /// empty pool. Input not shaped like `A.B.C.D#N` is rejected.
    #[instrument]
    pub fn from_spec(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::default());
        }

        let caps = RANGE_RE
            .captures(spec)
            .ok_or_else(|| VappError::InvalidPoolRange { range: spec.to_string() })?;

        // At most three digits each, so u16 never overflows here.
        let num = |i: usize| caps[i].parse::<u16>().unwrap_or(0);
        let mut ip = [num(1), num(2), num(3), num(4)];
        let count = num(5);

        if ip.iter().any(|&o| o > 255) {
            debug!("IP pool range {} has octets out of range, pool is empty", spec);
            return Ok(Self::default());
        }

        let mut available = BTreeSet::new();
        for _ in 0..count {
            available.insert(Ipv4Addr::new(ip[0] as u8, ip[1] as u8, ip[2] as u8, ip[3] as u8));
            ip = Self::next_ip(ip);
        }

        info!("Created IP pool with {} addresses from {}", available.len(), spec);
        Ok(Self { available, reserved: Vec::new() })
    }

    /// Take one address out of the pool.
    ///
    /// Returns `None` when the pool is exhausted. The caller owns the address
    /// until it hands it back through [`IpPool::unreserve`] after reserving it.
    pub fn allocate(&mut self) -> Option<Ipv4Addr> {
        let ip = self.available.pop_first()?;
        metrics::counter!("vapprun_ip_allocated_total").increment(1);
        debug!("Allocated {} ({} left)", ip, self.available.len());
        Some(ip)
    }

    /// Mark addresses as in use.
    ///
    /// Each address is moved out of the available set into the reserved list,
    /// even if the pool never handed it out. An address is never both
    /// available and reserved.
    pub fn reserve(&mut self, addresses: &HashSet<Ipv4Addr>) {
        let mut sorted: Vec<Ipv4Addr> = addresses.iter().copied().collect();
        sorted.sort();
        for ip in sorted {
            self.available.remove(&ip);
            if !self.reserved.contains(&ip) {
                self.reserved.push(ip);
            }
        }
    }

    /// Return a reserved address to the pool. No-op for unreserved addresses.
    pub fn unreserve(&mut self, ip: Ipv4Addr) {
        if let Some(pos) = self.reserved.iter().position(|r| *r == ip) {
            self.reserved.remove(pos);
            self.available.insert(ip);
            metrics::counter!("vapprun_ip_released_total").increment(1);
        }
    }

    pub fn is_available(&self, ip: Ipv4Addr) -> bool {
        self.available.contains(&ip)
    }

    pub fn is_reserved(&self, ip: Ipv4Addr) -> bool {
        self.reserved.contains(&ip)
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    /// Increment the low octet, carrying into higher ones. The address is
    /// returned unchanged when the first octet would overflow.
    fn next_ip(ip: [u16; 4]) -> [u16; 4] {
        let mut out = ip;
        out[3] += 1;
        let mut pos = 3;
        while pos > 0 && out[pos] > 255 {
            out[pos] = 0;
            out[pos - 1] += 1;
            pos -= 1;
        }
        if out[0] > 255 {
            return ip;
        }
        out
    }
}

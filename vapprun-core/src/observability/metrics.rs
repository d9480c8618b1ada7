//! Core metrics definitions.
//!
//! Counter names carry the `vapprun_` prefix and the `_total` suffix.

use metrics::{counter, describe_counter};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    describe_counter!("vapprun_vm_started_total", "VMs powered on (by backend)");
    describe_counter!("vapprun_vm_stopped_total", "VMs powered off (by mode: hard, soft)");
    describe_counter!("vapprun_ip_allocated_total", "Addresses handed out by the IP pool");
    describe_counter!("vapprun_ip_released_total", "Addresses returned to the IP pool");
    describe_counter!("vapprun_ip_propagated_total", "Guest addresses written into deploy parameters");
    describe_counter!("vapprun_env_published_total", "Environment documents published to VMs");
}

pub fn record_vm_started(backend: &str) {
    counter!("vapprun_vm_started_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_vm_stopped(hard: bool) {
    let mode = if hard { "hard" } else { "soft" };
    counter!("vapprun_vm_stopped_total", "mode" => mode).increment(1);
}

pub fn record_ip_propagated() {
    counter!("vapprun_ip_propagated_total").increment(1);
}

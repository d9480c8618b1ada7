//! Observability: structured logging and metrics.
//!
//! Logs go to stderr through `tracing-subscriber`; `RUST_LOG` overrides the
//! default level. Metrics are recorded through the `metrics` facade only, no
//! exporter is installed.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod metrics;

/// Install the global subscriber. Default level is `info`, `debug` when
/// `verbose` is set.
///
/// Calling it again is a no-op.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .try_init();

    if result.is_ok() {
        metrics::register_core_metrics();
        tracing::debug!("Observability initialized");
    }
}

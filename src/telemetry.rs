//! Process-wide logging setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever embeds it. Log output goes to stderr so that reports printed
//! on stdout stay machine-readable.

use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a formatted stderr subscriber.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `level` and
/// everything else at `warn`. Calling it again is a no-op.
///
/// # Arguments
///
/// * `level` - `"trace"`, `"debug"`, `"info"`, `"warn"` or `"error"`
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("warn,fleet_power_sim={level}").into());

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        debug!(level, "logging initialized");
    }
}

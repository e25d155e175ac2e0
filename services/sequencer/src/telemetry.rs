//! Tracing subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

/// Install a console subscriber. `RUST_LOG` overrides `level`.
///
/// Call once at startup, before any `tracing` events are emitted. A second
/// call is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! Tracing subscriber bootstrap.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a global tracing subscriber driven by `RUST_LOG`.
///
/// Defaults to `info` for this crate when `RUST_LOG` is unset. Safe to call
/// more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("prospector=info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

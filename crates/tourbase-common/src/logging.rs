//! Tracing/logging initialization for Tourbase
//!
//! Library crates only emit via `tracing`; hosts (and the integration test
//! suite) call [`init`] once to install a subscriber.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// The filter is taken from `RUST_LOG` when set, falling back to
/// `default_level` (e.g. `"info"` or `"tourbase_realtime=debug"`).
/// Calling this more than once is a no-op.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}

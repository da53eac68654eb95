//! Diagnostic tracing for the loop itself.
//!
//! - **Tracing (this module)**: `RUST_LOG`-controlled diagnostics on stderr.
//!   Not persisted.
//! - **Iteration records (`io/iteration_log`)**: per-iteration `meta.json` and
//!   agent output under `.taskloop/iterations/`. Always written.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=taskloop=info taskloop pilot
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

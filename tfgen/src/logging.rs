//! Development-time tracing.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate from
//! the progress lines `tfgen generate` prints and from the attempt artifacts in
//! `.tfgen/attempts/`, which are written regardless of `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// ```bash
/// RUST_LOG=tfgen=debug tfgen generate "two debian VMs on a private network"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

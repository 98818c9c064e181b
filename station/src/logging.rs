//! Tracing setup for the station binary.
//!
//! Diagnostics go to stderr so stdout stays reserved for JSON outcomes.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_level` (the configured `log_level`)
/// when unset or unparsable. Output: stderr, compact format. A second call keeps
/// the subscriber that is already installed and logs that at debug level.
///
/// # Example
/// ```bash
/// RUST_LOG=station=debug station plan --var env=dev
/// ```
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
    {
        tracing::debug!(%err, "tracing subscriber already installed; keeping it");
    }
}

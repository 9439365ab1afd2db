//! Logging initialization.
//!
//! Structured stderr logging via tracing-subscriber. The host is driven by
//! a CLI or a scheduler; job outcomes are observable only through these
//! logs, so every failure path records item key, attempt count, and error.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (from config) is used.
/// Safe to call once per process; later calls are ignored.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

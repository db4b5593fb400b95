//! Tracing/logging initialization.
//!
//! JSON logs filtered via `RUST_LOG`. The scheduler logs claim/dispatch
//! activity at `debug`, so `RUST_LOG=courseboard_queue=debug` is the first
//! thing to reach for when jobs sit in the queue.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them printed by the test harness. Use [`capture_logs`] to assert
//! on what was logged.

use convokit_core::{LogCollector, LogReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// Initialise a tracing subscriber that writes to the test-harness writer
/// and respects the `RUST_LOG` environment variable.
///
/// Safe to call multiple times; subsequent calls are silently ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Run `f` with a thread-local collector installed and return what it logged.
///
/// Only events emitted on the calling thread are captured, so use this with
/// synchronous code or a current-thread runtime.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogReader) {
    let collector = LogCollector::new(1024);
    let reader = collector.reader();
    let subscriber = tracing_subscriber::registry().with(collector);
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, reader)
}

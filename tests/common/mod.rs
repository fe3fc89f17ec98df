#![allow(dead_code)]
//! Shared integration test utilities.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initializes tracing output for tests, once per process.
///
/// Verbosity is controlled with `RUST_LOG`, e.g.
/// `RUST_LOG=strand=trace cargo test`.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

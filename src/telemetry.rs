//! # Test Logging
//!
//! Tracing setup for test binaries.
//!
//! The harness logs every lifecycle step through `tracing`; test binaries
//! call [`init`] once so those logs surface in test output. Verbosity is
//! controlled with `RUST_LOG` as usual.

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber for a test binary.
///
/// Safe to call from every test; only the first call installs the
/// subscriber, later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

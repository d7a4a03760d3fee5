//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber for the binary
//! - Honour `RUST_LOG`, falling back to the configured filter
//!
//! # Design Decisions
//! - Human-readable `fmt` output on stdout
//! - Tests use the test writer so output is captured per test

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Panics if one is already set.
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Test subscriber. Safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

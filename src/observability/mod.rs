//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! store / config / runtime produce:
//!     → tracing events (structured fields: config, member, path)
//!     → metrics.rs (load, save and external change counters)
//!
//! Consumers:
//!     → logging.rs installs the stdout subscriber in the binary
//!     → any `metrics` recorder the host installs
//! ```
//!
//! # Design Decisions
//! - The library only emits; the host picks the subscriber and recorder
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

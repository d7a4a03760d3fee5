//! Process lifecycle helpers.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → SignalEvent::Shutdown → ConfigRuntime::shutdown
//!     SIGHUP         → SignalEvent::Reload   → ConfigRuntime::trigger_load_all
//!
//! Shutdown (shutdown.rs):
//!     stop flag set → background thread joined with a deadline
//! ```
//!
//! # Design Decisions
//! - Shutdown has a timeout: a stuck thread is abandoned, not awaited
//! - SIGHUP reloads config files, it never stops the process

pub mod shutdown;
pub mod signals;

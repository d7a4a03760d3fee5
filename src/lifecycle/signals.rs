//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM, SIGINT and SIGHUP
//! - Translate them to [`SignalEvent`]s for the binary's main loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a config reload, not shutdown
//! - On non-unix targets only Ctrl-C is observed

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Installs the handlers once and yields events for as long as it lives.
pub struct Signals {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hup: tokio::signal::unix::Signal,
}

impl Signals {
    /// Must be called inside a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                term: signal(SignalKind::terminate())?,
                hup: signal(SignalKind::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Waits for the next signal.
    pub async fn next(&mut self) -> SignalEvent {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT");
                    SignalEvent::Shutdown
                }
                _ = self.term.recv() => {
                    tracing::info!("Received SIGTERM");
                    SignalEvent::Shutdown
                }
                _ = self.hup.recv() => {
                    tracing::info!("Received SIGHUP");
                    SignalEvent::Reload
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Ctrl-C handler failed");
            }
            SignalEvent::Shutdown
        }
    }
}

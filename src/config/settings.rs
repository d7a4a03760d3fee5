//! Settings of the config runtime itself.
//!
//! Read from a TOML file by [`load_settings`](super::loader::load_settings).
//! Every field has a default so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings for a [`ConfigRuntime`](crate::runtime::ConfigRuntime).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Directory holding one file per config.
    pub data_dir: PathBuf,

    /// Extension used when none of a config's preferred formats is registered.
    pub default_format: String,

    /// Reload configs when their files change on disk.
    pub watch_files: bool,

    /// How long shutdown waits for the save thread before the final flush.
    pub shutdown_timeout_ms: u64,

    /// Fallback `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("UserData"),
            default_format: "json".to_string(),
            watch_files: true,
            shutdown_timeout_ms: 5_000,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeSettings {
    /// Default settings rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

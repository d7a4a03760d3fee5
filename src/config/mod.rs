//! Config files and the facade that binds one to a store.
//!
//! # Data Flow
//! ```text
//! <data_dir>/<name>.<ext>
//!     → provider.rs (decode to Value, lenient)
//!     → ConfigStore::read_from (one transaction over the store tree)
//!     → Changed / OnReload hooks
//!
//! store transaction completes:
//!     → root change signal → save thread
//!     → Config::save (self-write counted)
//!     → provider.rs (encode, temp file + rename)
//!
//! watcher.rs sees the file replaced:
//!     → Config::note_file_event (debounce against self-writes)
//!     → load queued on the runtime
//! ```
//!
//! # Design Decisions
//! - A Config owns one root store, set once, for the life of the runtime
//! - Loads and saves of one Config are serialized by its own I/O lock
//! - Runtime settings are a separate TOML file with defaults for every field

mod facade;
pub mod json_provider;
pub mod loader;
pub mod provider;
pub mod settings;
pub mod toml_provider;
pub mod validation;
pub mod watcher;

pub use facade::Config;
pub(crate) use facade::ConfigParts;
pub use json_provider::JsonProvider;
pub use provider::{FormatProvider, ProviderError, ProviderRegistry};
pub use settings::RuntimeSettings;
pub use toml_provider::TomlProvider;

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::store::ChangeSignal;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("config runtime is stopped")]
    RuntimeStopped,

    #[error("load was cancelled before it ran")]
    LoadCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Type-erased root store as the runtime sees it.
pub trait ConfigStore: Send + Sync {
    /// Merges the document at `path` into the store tree.
    fn read_from(&self, provider: &dyn FormatProvider, path: &Path);

    /// Serializes the store tree to `path`.
    fn write_to(&self, provider: &dyn FormatProvider, path: &Path) -> Result<(), ProviderError>;

    fn change_signal(&self) -> Option<Arc<ChangeSignal>>;

    fn is_root(&self) -> bool;

    fn type_name(&self) -> &'static str;
}

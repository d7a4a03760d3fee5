//! File-format backends.
//!
//! # Responsibilities
//! - Map one file format to and from the [`Value`] tree
//! - Read documents leniently: absence and parse failures both mean "empty"
//! - Replace files atomically so one save is one file event
//!
//! # Design Decisions
//! - Providers are stateless and shared; the file path is an argument
//! - The registry is keyed by file extension and owned by the runtime

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::{ConfigError, JsonProvider, TomlProvider};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cannot encode document: {0}")]
    Encode(String),
}

impl ProviderError {
    fn io(path: &Path, source: io::Error) -> Self {
        ProviderError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One file format.
pub trait FormatProvider: Send + Sync {
    /// File extension without the dot, e.g. `json`.
    fn extension(&self) -> &str;

    fn decode(&self, text: &str) -> Result<Value, ProviderError>;

    fn encode(&self, value: &Value) -> Result<String, ProviderError>;

    /// Reads the document at `path`.
    ///
    /// A missing file is `Null`. Read and parse failures are logged and also
    /// yield `Null`.
    fn load(&self, path: &Path) -> Value {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Value::Null,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read config file");
                return Value::Null;
            }
        };

        match self.decode(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse config file");
                Value::Null
            }
        }
    }

    /// Writes `value` to `path`, creating parent directories.
    ///
    /// The document goes to a hidden sibling first and is renamed over `path`.
    fn store(&self, value: &Value, path: &Path) -> Result<(), ProviderError> {
        let text = self.encode(value)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| ProviderError::io(dir, e))?;
        }

        let tmp = temp_path(path);
        fs::write(&tmp, text).map_err(|e| ProviderError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(ProviderError::io(path, e));
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Providers by extension.
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn FormatProvider>>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// JSON and TOML.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        for provider in [
            Arc::new(JsonProvider::new()) as Arc<dyn FormatProvider>,
            Arc::new(TomlProvider::new()),
        ] {
            if let Err(e) = registry.register(provider) {
                tracing::error!(error = %e, "Failed to register built-in provider");
            }
        }
        registry
    }

    /// Adds a provider. Each extension can be registered once.
    pub fn register(&self, provider: Arc<dyn FormatProvider>) -> Result<(), ConfigError> {
        let ext = provider.extension().to_ascii_lowercase();
        match self.providers.entry(ext) {
            Entry::Occupied(e) => Err(ConfigError::InvalidState(format!(
                "a provider for extension '{}' is already registered",
                e.key()
            ))),
            Entry::Vacant(e) => {
                tracing::debug!(extension = %e.key(), "Registered config provider");
                e.insert(provider);
                Ok(())
            }
        }
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn FormatProvider>> {
        self.providers
            .get(&extension.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// The first registered extension of `preferred`, else `default`.
    pub fn choose(&self, preferred: &[&str], default: &str) -> Option<Arc<dyn FormatProvider>> {
        preferred
            .iter()
            .find_map(|ext| self.get(ext))
            .or_else(|| self.get(default))
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.get(extension).is_some()
    }

    /// The provider for `path`'s extension.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn FormatProvider>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

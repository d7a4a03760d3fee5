//! Runtime orchestrator.
//!
//! # Responsibilities
//! - Create and register one [`Config`] per `<data_dir>/<name>.<ext>`
//! - Run loads one at a time on the load thread
//! - Save a config whenever its store completes a transaction
//! - Reload a config when its file is replaced by someone else
//! - Stop in order and flush every config on shutdown
//!
//! # Design Decisions
//! - The config list is append-only and published through `ArcSwap`
//! - One watcher per directory, created on first use and cached
//! - Background threads hold the runtime weakly so dropping the handle stops it
//!
//! # Shutdown Order
//! ```text
//! stop flag → watchers dropped → load queue drained
//!           → save thread stopped (bounded join) → final save of every config
//! ```

mod load;
mod save;

pub use load::LoadHandle;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::ConfigParts;
use crate::config::validation::validate_settings;
use crate::config::watcher::DirectoryWatcher;
use crate::config::{Config, ConfigError, ProviderRegistry, RuntimeSettings};
use crate::lifecycle::shutdown::join_with_deadline;
use crate::observability::metrics;
use crate::schema::SchemaCache;
use crate::store::{ChangeSignal, SignalHub};

use load::LoadScheduler;

pub(crate) struct RuntimeInner {
    settings: RuntimeSettings,
    data_dir: PathBuf,
    providers: Arc<ProviderRegistry>,
    schemas: Arc<SchemaCache>,
    pub(crate) configs: ArcSwap<Vec<Arc<Config>>>,
    by_path: DashMap<PathBuf, Arc<Config>>,
    watchers: DashMap<PathBuf, DirectoryWatcher>,
    pub(crate) hub: Arc<SignalHub>,
    pub(crate) configs_changed: Arc<ChangeSignal>,
    loads: LoadScheduler,
    save_thread: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
    pub(crate) save_stop: Arc<AtomicBool>,
}

impl RuntimeInner {
    pub(crate) fn enqueue_load(&self, config: Arc<Config>) -> Result<LoadHandle, ConfigError> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(ConfigError::RuntimeStopped);
        }
        self.loads.submit(config)
    }

    fn file_changed(&self, path: &Path) {
        if self.stopping.load(Ordering::Acquire) {
            return;
        }
        let Some(config) = self.by_path.get(path).map(|entry| Arc::clone(entry.value())) else {
            return;
        };
        if !config.has_store() {
            return;
        }

        if !config.note_file_event() {
            tracing::debug!(config = %config.name(), "Ignoring event for own save");
            return;
        }

        metrics::record_external_change(config.name());
        tracing::info!(config = %config.name(), path = %path.display(), "Config file changed, reloading");
        if let Err(e) = self.enqueue_load(config) {
            tracing::warn!(path = %path.display(), error = %e, "Reload not queued");
        }
    }

    fn ensure_watcher(self: &Arc<Self>, dir: &Path) -> Result<(), ConfigError> {
        if self.watchers.contains_key(dir) {
            return Ok(());
        }
        let weak: Weak<RuntimeInner> = Arc::downgrade(self);
        self.watchers
            .entry(dir.to_path_buf())
            .or_try_insert_with(|| {
                DirectoryWatcher::start(dir, move |path| {
                    if let Some(runtime) = weak.upgrade() {
                        runtime.file_changed(path);
                    }
                })
            })?;
        Ok(())
    }

    fn save_all(&self) {
        for config in self.configs.load().iter() {
            // Failures are logged by `save`.
            let _ = config.save();
        }
    }
}

/// Owns every config of a data directory and the threads that keep them in
/// sync with their files.
///
/// Dropping the runtime shuts it down.
pub struct ConfigRuntime {
    inner: Arc<RuntimeInner>,
}

impl ConfigRuntime {
    /// Starts a runtime with the built-in providers and an empty converter registry.
    pub fn start(settings: RuntimeSettings) -> Result<Self, ConfigError> {
        Self::with_registries(
            settings,
            Arc::new(ProviderRegistry::with_defaults()),
            Arc::new(SchemaCache::default()),
        )
    }

    pub fn with_registries(
        settings: RuntimeSettings,
        providers: Arc<ProviderRegistry>,
        schemas: Arc<SchemaCache>,
    ) -> Result<Self, ConfigError> {
        if let Err(errors) = validate_settings(&settings) {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::InvalidState(format!("invalid runtime settings: {message}")));
        }
        if !providers.contains(&settings.default_format) {
            return Err(ConfigError::InvalidState(format!(
                "no provider registered for default format '{}'",
                settings.default_format
            )));
        }

        fs::create_dir_all(&settings.data_dir)?;
        let data_dir = fs::canonicalize(&settings.data_dir)?;

        let inner = Arc::new(RuntimeInner {
            settings,
            data_dir,
            providers,
            schemas,
            configs: ArcSwap::from_pointee(Vec::new()),
            by_path: DashMap::new(),
            watchers: DashMap::new(),
            hub: Arc::new(SignalHub::new()),
            configs_changed: Arc::new(ChangeSignal::new()),
            loads: LoadScheduler::start()?,
            save_thread: Mutex::new(None),
            stopping: AtomicBool::new(false),
            save_stop: Arc::new(AtomicBool::new(false)),
        });
        inner.configs_changed.attach(Arc::clone(&inner.hub));

        match save::spawn(Arc::downgrade(&inner)) {
            Ok(handle) => {
                *inner.save_thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => {
                inner.loads.drain();
                return Err(e.into());
            }
        }

        tracing::info!(
            data_dir = %inner.data_dir.display(),
            default_format = %inner.settings.default_format,
            watch_files = inner.settings.watch_files,
            "Config runtime started"
        );
        Ok(Self { inner })
    }

    /// The config named `name`, stored in the first registered format of
    /// `preferred` or the default format.
    ///
    /// Each file can back one config only.
    pub fn config_for(&self, name: &str, preferred: &[&str]) -> Result<Arc<Config>, ConfigError> {
        let inner = &self.inner;
        if inner.stopping.load(Ordering::Acquire) {
            return Err(ConfigError::RuntimeStopped);
        }
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ConfigError::InvalidState(format!("invalid config name '{name}'")));
        }

        let provider = inner
            .providers
            .choose(preferred, &inner.settings.default_format)
            .ok_or_else(|| {
                ConfigError::InvalidState(format!(
                    "no provider for {preferred:?} or '{}'",
                    inner.settings.default_format
                ))
            })?;
        let path = inner
            .data_dir
            .join(format!("{name}.{}", provider.extension()));

        if inner.by_path.contains_key(&path) {
            return Err(duplicate_path(&path));
        }
        // Nothing is registered until the directory is watched.
        if inner.settings.watch_files {
            if let Some(dir) = path.parent() {
                inner.ensure_watcher(dir)?;
            }
        }

        let config = match inner.by_path.entry(path.clone()) {
            Entry::Occupied(_) => return Err(duplicate_path(&path)),
            Entry::Vacant(slot) => {
                let config = Config::new(ConfigParts {
                    name: name.to_string(),
                    provider,
                    path: path.clone(),
                    watched: inner.settings.watch_files,
                    schemas: Arc::clone(&inner.schemas),
                    hub: Arc::clone(&inner.hub),
                    config_set_changed: Arc::clone(&inner.configs_changed),
                    runtime: Arc::downgrade(inner),
                });
                slot.insert(Arc::clone(&config));
                config
            }
        };

        inner.configs.rcu(|configs| {
            let mut configs = Vec::clone(configs);
            configs.push(Arc::clone(&config));
            configs
        });
        inner.configs_changed.set();

        tracing::info!(config = %name, path = %path.display(), "Config registered");
        Ok(config)
    }

    /// Queues a load of every config that has a store.
    pub fn trigger_load_all(&self) -> Result<Vec<LoadHandle>, ConfigError> {
        self.inner
            .configs
            .load()
            .iter()
            .filter(|config| config.has_store())
            .map(|config| self.inner.enqueue_load(Arc::clone(config)))
            .collect()
    }

    /// Saves every config now. Failures are logged.
    pub fn save_all(&self) {
        self.inner.save_all();
    }

    pub fn configs(&self) -> Vec<Arc<Config>> {
        self.inner.configs.load().iter().cloned().collect()
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    /// Canonical data directory.
    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.inner.providers
    }

    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.inner.schemas
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Stops watching, loading and saving, then saves every config once.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Config runtime shutting down");

        inner.watchers.clear();
        inner.loads.drain();

        inner.save_stop.store(true, Ordering::Release);
        inner.hub.notify();
        let handle = inner
            .save_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if !join_with_deadline(handle, inner.settings.shutdown_timeout()) {
                tracing::warn!(
                    timeout_ms = inner.settings.shutdown_timeout_ms,
                    "Save thread did not stop in time"
                );
            }
        }

        inner.save_all();
        tracing::info!(configs = inner.configs.load().len(), "Config runtime stopped");
    }
}

fn duplicate_path(path: &Path) -> ConfigError {
    ConfigError::InvalidState(format!("a config for {} already exists", path.display()))
}

impl Drop for ConfigRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path) -> RuntimeSettings {
        RuntimeSettings {
            watch_files: false,
            ..RuntimeSettings::with_data_dir(dir)
        }
    }

    #[test]
    fn test_config_path_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ConfigRuntime::start(settings(dir.path())).unwrap();

        let json = runtime.config_for("alpha", &[]).unwrap();
        let toml = runtime.config_for("beta", &["yaml", "toml"]).unwrap();

        assert_eq!(json.path(), runtime.data_dir().join("alpha.json"));
        assert_eq!(toml.path(), runtime.data_dir().join("beta.toml"));
        assert_eq!(runtime.configs().len(), 2);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ConfigRuntime::start(settings(dir.path())).unwrap();

        runtime.config_for("alpha", &[]).unwrap();
        let err = runtime.config_for("alpha", &["json"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidState(_)));
        assert!(runtime.config_for("alpha", &["toml"]).is_ok());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ConfigRuntime::start(settings(dir.path())).unwrap();
        for name in ["", "a/b", ".."] {
            assert!(matches!(
                runtime.config_for(name, &[]),
                Err(ConfigError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn test_unknown_default_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RuntimeSettings {
            default_format: "yaml".to_string(),
            ..settings(dir.path())
        };
        assert!(ConfigRuntime::start(settings).is_err());
    }

    #[test]
    fn test_failed_watcher_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let runtime = ConfigRuntime::start(RuntimeSettings::with_data_dir(&data_dir)).unwrap();

        fs::remove_dir(&data_dir).unwrap();
        assert!(runtime.config_for("alpha", &[]).is_err());
        assert!(runtime.configs().is_empty());

        fs::create_dir(&data_dir).unwrap();
        let config = runtime.config_for("alpha", &[]).unwrap();
        assert_eq!(config.path(), runtime.data_dir().join("alpha.json"));
        assert_eq!(runtime.configs().len(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ConfigRuntime::start(settings(dir.path())).unwrap();
        runtime.shutdown();
        runtime.shutdown();
        assert!(runtime.is_stopped());
        assert!(matches!(
            runtime.config_for("late", &[]),
            Err(ConfigError::RuntimeStopped)
        ));
    }
}

//! The per-file facade the runtime hands out.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use super::{ConfigError, ConfigStore, FormatProvider};
use crate::observability::metrics;
use crate::runtime::{LoadHandle, RuntimeInner};
use crate::schema::{Configurable, SchemaCache};
use crate::store::{ChangeSignal, SignalHub, Store};

/// One config file bound to one root store.
///
/// Created by [`ConfigRuntime::config_for`](crate::runtime::ConfigRuntime::config_for)
/// and kept alive by the runtime until shutdown.
pub struct Config {
    me: Weak<Config>,
    name: String,
    provider: Arc<dyn FormatProvider>,
    path: PathBuf,
    store: OnceLock<Arc<dyn ConfigStore>>,
    /// Self-writes not yet matched by a file event. Only counted when watched.
    writes: AtomicI64,
    watched: bool,
    io: Mutex<()>,
    schemas: Arc<SchemaCache>,
    hub: Arc<SignalHub>,
    config_set_changed: Arc<ChangeSignal>,
    runtime: Weak<RuntimeInner>,
}

pub(crate) struct ConfigParts {
    pub name: String,
    pub provider: Arc<dyn FormatProvider>,
    pub path: PathBuf,
    pub watched: bool,
    pub schemas: Arc<SchemaCache>,
    pub hub: Arc<SignalHub>,
    pub config_set_changed: Arc<ChangeSignal>,
    pub runtime: Weak<RuntimeInner>,
}

impl Config {
    pub(crate) fn new(parts: ConfigParts) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            name: parts.name,
            provider: parts.provider,
            path: parts.path,
            store: OnceLock::new(),
            writes: AtomicI64::new(0),
            watched: parts.watched,
            io: Mutex::new(()),
            schemas: parts.schemas,
            hub: parts.hub,
            config_set_changed: parts.config_set_changed,
            runtime: parts.runtime,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provider(&self) -> &Arc<dyn FormatProvider> {
        &self.provider
    }

    pub fn has_store(&self) -> bool {
        self.store.get().is_some()
    }

    /// Self-writes whose file event has not arrived yet.
    pub fn pending_writes(&self) -> i64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Binds the root store. Allowed once.
    pub fn set_store(&self, store: Arc<dyn ConfigStore>) -> Result<(), ConfigError> {
        if !store.is_root() {
            return Err(ConfigError::InvalidState(format!(
                "config '{}': {} is not a root store",
                self.name,
                store.type_name()
            )));
        }
        let signal = store.change_signal();
        let type_name = store.type_name();

        self.store.set(store).map_err(|_| {
            ConfigError::InvalidState(format!("config '{}' already has a store", self.name))
        })?;

        if let Some(signal) = signal {
            signal.attach(Arc::clone(&self.hub));
        }
        self.config_set_changed.set();
        tracing::debug!(config = %self.name, config_type = type_name, "Store bound");
        Ok(())
    }

    /// Creates a root store for `T`, binds it and loads the file into it.
    pub fn generated<T: Configurable>(&self) -> Result<Store<T>, ConfigError> {
        let store = Store::new_root(T::default(), Arc::clone(&self.schemas));
        self.set_store(Arc::new(store.clone()))?;
        self.load_sync()?;
        Ok(store)
    }

    /// Queues a load and blocks until it ran.
    pub fn load_sync(&self) -> Result<(), ConfigError> {
        self.load_async()?.wait()
    }

    /// Queues a load on the runtime's load thread.
    pub fn load_async(&self) -> Result<LoadHandle, ConfigError> {
        if !self.has_store() {
            return Err(ConfigError::InvalidState(format!(
                "config '{}' has no store to load into",
                self.name
            )));
        }
        let runtime = self.runtime.upgrade().ok_or(ConfigError::RuntimeStopped)?;
        let me = self.me.upgrade().ok_or(ConfigError::RuntimeStopped)?;
        runtime.enqueue_load(me)
    }

    /// Writes the store to the file now, on the calling thread.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(store) = self.store.get() else {
            return Ok(());
        };
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);

        if self.watched {
            self.writes.fetch_add(1, Ordering::AcqRel);
        }
        match store.write_to(self.provider.as_ref(), &self.path) {
            Ok(()) => {
                metrics::record_save(&self.name, "ok");
                tracing::debug!(config = %self.name, path = %self.path.display(), "Config saved");
                Ok(())
            }
            Err(e) => {
                if self.watched {
                    self.writes.fetch_sub(1, Ordering::AcqRel);
                }
                metrics::record_save(&self.name, "error");
                tracing::error!(
                    config = %self.name,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to save config"
                );
                Err(e.into())
            }
        }
    }

    /// Accounts one file event. `true` when it was not caused by our own save.
    pub(crate) fn note_file_event(&self) -> bool {
        let before = self.writes.fetch_sub(1, Ordering::AcqRel);
        if before <= 0 {
            self.ensure_writes_sane();
            true
        } else {
            false
        }
    }

    fn ensure_writes_sane(&self) {
        let mut current = self.writes.load(Ordering::Acquire);
        while current < 0 {
            match self
                .writes
                .compare_exchange(current, 0, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Runs on the load thread.
    pub(crate) fn perform_load(&self) -> Result<(), ConfigError> {
        let store = self.store.get().ok_or_else(|| {
            ConfigError::InvalidState(format!("config '{}' has no store to load into", self.name))
        })?;
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        store.read_from(self.provider.as_ref(), &self.path);
        metrics::record_load(&self.name);
        Ok(())
    }

    pub(crate) fn change_signal(&self) -> Option<Arc<ChangeSignal>> {
        self.store.get().and_then(|store| store.change_signal())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("format", &self.provider.extension())
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonProvider;
    use crate::schema::SchemaBuilder;

    #[derive(Default)]
    struct Sample {
        level: i64,
    }

    impl Configurable for Sample {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("level", |s| &s.level, |s| &mut s.level);
        }
    }

    fn detached_config(dir: &Path) -> Arc<Config> {
        Config::new(ConfigParts {
            name: "sample".to_string(),
            provider: Arc::new(JsonProvider::new()),
            path: dir.join("sample.json"),
            watched: true,
            schemas: Arc::new(SchemaCache::default()),
            hub: Arc::new(SignalHub::new()),
            config_set_changed: Arc::new(ChangeSignal::new()),
            runtime: Weak::new(),
        })
    }

    #[test]
    fn test_self_writes_do_not_trigger_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = detached_config(dir.path());
        let store = Store::new_root(Sample::default(), Arc::new(SchemaCache::default()));
        config.set_store(Arc::new(store)).unwrap();

        for _ in 0..3 {
            config.save().unwrap();
        }
        assert_eq!(config.pending_writes(), 3);

        let reloads = (0..3).filter(|_| config.note_file_event()).count();
        assert_eq!(reloads, 0);

        assert!(config.note_file_event());
        assert_eq!(config.pending_writes(), 0);
    }

    #[test]
    fn test_negative_counter_resyncs() {
        let dir = tempfile::tempdir().unwrap();
        let config = detached_config(dir.path());
        assert!(config.note_file_event());
        assert!(config.note_file_event());
        assert_eq!(config.pending_writes(), 0);
    }

    #[test]
    fn test_set_store_twice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let config = detached_config(dir.path());
        let schemas = Arc::new(SchemaCache::default());

        config
            .set_store(Arc::new(Store::new_root(Sample::default(), Arc::clone(&schemas))))
            .unwrap();
        let err = config
            .set_store(Arc::new(Store::new_root(Sample::default(), schemas)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidState(_)));
    }

    #[test]
    fn test_non_root_store_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = detached_config(dir.path());
        let err = config.set_store(Arc::new(Store::new(Sample::default()))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidState(_)));
        assert!(!config.has_store());
    }

    #[test]
    fn test_load_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let config = detached_config(dir.path());
        assert!(matches!(config.load_sync(), Err(ConfigError::InvalidState(_))));

        config
            .set_store(Arc::new(Store::new_root(Sample::default(), Arc::new(SchemaCache::default()))))
            .unwrap();
        assert!(matches!(config.load_sync(), Err(ConfigError::RuntimeStopped)));
    }

    #[test]
    fn test_perform_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample.json"), r#"{"level": 7}"#).unwrap();
        let config = detached_config(dir.path());
        let store = Store::new_root(Sample::default(), Arc::new(SchemaCache::default()));
        config.set_store(Arc::new(store.clone())).unwrap();

        config.perform_load().unwrap();
        assert_eq!(store.read(|s| s.level), 7);
    }
}

//! End-to-end runtime behaviour against real files and watchers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use config_store::config::{FormatProvider, JsonProvider};
use config_store::{ConfigError, ConfigRuntime, Store, Value};
use tempfile::TempDir;

mod common;

use common::{settings, wait_until, write_external, AppConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    _dir: TempDir,
    runtime: ConfigRuntime,
}

fn start(watch_files: bool) -> Fixture {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let runtime = ConfigRuntime::start(settings(dir.path(), watch_files)).unwrap();
    Fixture { _dir: dir, runtime }
}

fn level_on_disk(path: &std::path::Path) -> Option<i64> {
    JsonProvider::new()
        .load(path)
        .as_map()
        .and_then(|map| map.get("level"))
        .and_then(Value::as_integer)
}

#[test]
fn test_first_load_creates_file() {
    let fx = start(true);
    let config = fx.runtime.config_for("app", &[]).unwrap();
    let store = config.generated::<AppConfig>().unwrap();

    assert!(wait_until(TIMEOUT, || config.path().exists()));
    assert!(wait_until(TIMEOUT, || {
        JsonProvider::new().load(config.path()) == store.serialize()
    }));
}

#[test]
fn test_external_edit_reloads() {
    let fx = start(true);
    let config = fx.runtime.config_for("app", &[]).unwrap();

    let reloads = Arc::new(AtomicUsize::new(0));
    let changes = Arc::new(AtomicUsize::new(0));
    let store = Store::new_root(
        AppConfig::counting(&reloads, &changes),
        Arc::clone(fx.runtime.schemas()),
    );
    config.set_store(Arc::new(store.clone())).unwrap();
    config.load_sync().unwrap();
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    assert!(wait_until(TIMEOUT, || config.path().exists() && config.pending_writes() == 0));

    write_external(config.path(), r#"{"level": 42, "title": "edited"}"#);

    assert!(wait_until(TIMEOUT, || store.read(|c| c.level) == 42));
    store.read(|c| assert_eq!(c.title, "edited"));
    assert!(reloads.load(Ordering::SeqCst) >= 2);

    // The partial document is completed by a save.
    assert!(wait_until(TIMEOUT, || {
        JsonProvider::new().load(config.path()) == store.serialize()
    }));
}

#[test]
fn test_own_saves_do_not_reload() {
    let fx = start(true);
    let config = fx.runtime.config_for("app", &[]).unwrap();

    let reloads = Arc::new(AtomicUsize::new(0));
    let changes = Arc::new(AtomicUsize::new(0));
    let store = Store::new_root(
        AppConfig::counting(&reloads, &changes),
        Arc::clone(fx.runtime.schemas()),
    );
    config.set_store(Arc::new(store.clone())).unwrap();
    config.load_sync().unwrap();
    assert!(wait_until(TIMEOUT, || config.path().exists() && config.pending_writes() == 0));
    let baseline = reloads.load(Ordering::SeqCst);

    for level in 1..=3 {
        store.write(|c| c.level = level);
        assert!(wait_until(TIMEOUT, || level_on_disk(config.path()) == Some(level)));
    }
    assert!(wait_until(TIMEOUT, || config.pending_writes() == 0));
    thread::sleep(Duration::from_millis(200));

    assert_eq!(reloads.load(Ordering::SeqCst), baseline);
    assert_eq!(store.read(|c| c.level), 3);
}

#[test]
fn test_external_edit_after_own_saves_reloads_once() {
    let fx = start(true);
    let config = fx.runtime.config_for("app", &[]).unwrap();

    let reloads = Arc::new(AtomicUsize::new(0));
    let changes = Arc::new(AtomicUsize::new(0));
    let store = Store::new_root(
        AppConfig::counting(&reloads, &changes),
        Arc::clone(fx.runtime.schemas()),
    );
    config.set_store(Arc::new(store.clone())).unwrap();
    config.load_sync().unwrap();
    assert!(wait_until(TIMEOUT, || config.path().exists() && config.pending_writes() == 0));
    let baseline = reloads.load(Ordering::SeqCst);

    for _ in 0..3 {
        config.save().unwrap();
    }
    assert!(wait_until(TIMEOUT, || config.pending_writes() == 0));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(reloads.load(Ordering::SeqCst), baseline);

    // A complete document, so the reload itself does not save.
    let mut doc = store.serialize();
    if let Value::Map(map) = &mut doc {
        map.insert("level", Value::Integer(99));
    }
    write_external(config.path(), &JsonProvider::new().encode(&doc).unwrap());

    assert!(wait_until(TIMEOUT, || store.read(|c| c.level) == 99));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(reloads.load(Ordering::SeqCst), baseline + 1);
    assert_eq!(config.pending_writes(), 0);
}

#[test]
fn test_out_of_range_number_keeps_user_values() {
    let fx = start(false);
    let config = fx.runtime.config_for("app", &[]).unwrap();
    std::fs::write(config.path(), r#"{"level": 42, "ratio": 1e-30, "title": "kept"}"#).unwrap();

    let store = config.generated::<AppConfig>().unwrap();
    store.read(|c| {
        assert_eq!(c.level, 42);
        assert_eq!(c.title, "kept");
    });
    assert!(wait_until(TIMEOUT, || level_on_disk(config.path()) == Some(42)));
}

#[test]
fn test_set_store_twice_is_rejected() {
    let fx = start(false);
    let config = fx.runtime.config_for("app", &[]).unwrap();
    config.generated::<AppConfig>().unwrap();

    let err = config.generated::<AppConfig>().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidState(_)));
}

#[test]
fn test_shutdown_flushes_and_restart_restores() {
    let dir = TempDir::new().unwrap();
    common::init_logging();

    {
        let runtime = ConfigRuntime::start(settings(dir.path(), false)).unwrap();
        let config = runtime.config_for("app", &["toml"]).unwrap();
        let store = config.generated::<AppConfig>().unwrap();
        store.write(|c| {
            c.level = 77;
            c.nickname = Some("persisted".to_string());
            c.tags = vec!["x".to_string(), "y".to_string()];
        });
        store.read(|c| c.network.clone()).write(|n| n.port = 4242);
        runtime.shutdown();

        assert!(matches!(config.load_sync(), Err(ConfigError::RuntimeStopped)));
    }
    assert!(dir.path().join("app.toml").exists());

    let runtime = ConfigRuntime::start(settings(dir.path(), false)).unwrap();
    let config = runtime.config_for("app", &["toml"]).unwrap();
    let store = config.generated::<AppConfig>().unwrap();
    store.read(|c| {
        assert_eq!(c.level, 77);
        assert_eq!(c.nickname.as_deref(), Some("persisted"));
        assert_eq!(c.tags, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(c.network.read(|n| n.port), 4242);
    });
}

#[test]
fn test_trigger_load_all_picks_up_edits() {
    let fx = start(false);
    let first = fx.runtime.config_for("first", &[]).unwrap();
    let second = fx.runtime.config_for("second", &[]).unwrap();
    let unbound = fx.runtime.config_for("unbound", &[]).unwrap();
    let a = first.generated::<AppConfig>().unwrap();
    let b = second.generated::<AppConfig>().unwrap();
    assert!(!unbound.has_store());

    assert!(wait_until(TIMEOUT, || first.path().exists() && second.path().exists()));
    write_external(first.path(), r#"{"level": 1}"#);
    write_external(second.path(), r#"{"level": 2}"#);

    let handles = fx.runtime.trigger_load_all().unwrap();
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.wait().unwrap();
    }
    assert_eq!(a.read(|c| c.level), 1);
    assert_eq!(b.read(|c| c.level), 2);
}

#[tokio::test]
async fn test_async_load_handle() {
    let fx = start(false);
    let config = fx.runtime.config_for("app", &[]).unwrap();
    std::fs::write(config.path(), r#"{"title": "async"}"#).unwrap();

    let store = Store::new_root(AppConfig::default(), Arc::clone(fx.runtime.schemas()));
    config.set_store(Arc::new(store.clone())).unwrap();

    config.load_async().unwrap().finished().await.unwrap();
    assert_eq!(store.read(|c| c.title.clone()), "async");
}

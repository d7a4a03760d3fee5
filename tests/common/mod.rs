//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use config_store::schema::{Configurable, SchemaBuilder};
use config_store::{config_enum, inline_config, RuntimeSettings, Store};

config_enum! {
    #[derive(Default)]
    pub enum Theme {
        #[default]
        Light,
        Dark,
        HighContrast,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    pub width: u32,
    pub height: u32,
}

impl Configurable for Window {
    fn describe(s: &mut SchemaBuilder<Self>) {
        s.field("width", |w| &w.width, |w| &mut w.width);
        s.field("height", |w| &w.height, |w| &mut w.height);
    }
}

inline_config!(Window);

#[derive(Debug, Default)]
pub struct Network {
    pub host: String,
    pub port: u16,
}

impl Configurable for Network {
    fn describe(s: &mut SchemaBuilder<Self>) {
        s.field("host", |n| &n.host, |n| &mut n.host);
        s.field("port", |n| &n.port, |n| &mut n.port);
    }
}

/// A config with scalar, enum, inline, nested and collection members.
///
/// `reloads` and `changes` are not serialized; they count hook calls.
#[derive(Debug, Default)]
pub struct AppConfig {
    pub level: i64,
    pub ratio: f64,
    pub title: String,
    pub theme: Theme,
    pub nickname: Option<String>,
    pub window: Window,
    pub network: Store<Network>,
    pub tags: Vec<String>,
    pub reloads: Arc<AtomicUsize>,
    pub changes: Arc<AtomicUsize>,
}

impl AppConfig {
    pub fn counting(reloads: &Arc<AtomicUsize>, changes: &Arc<AtomicUsize>) -> Self {
        Self {
            reloads: Arc::clone(reloads),
            changes: Arc::clone(changes),
            ..Self::default()
        }
    }
}

impl Configurable for AppConfig {
    fn describe(s: &mut SchemaBuilder<Self>) {
        s.field("level", |c| &c.level, |c| &mut c.level);
        s.field("ratio", |c| &c.ratio, |c| &mut c.ratio);
        s.field("title", |c| &c.title, |c| &mut c.title);
        s.field("theme", |c| &c.theme, |c| &mut c.theme);
        s.field("nickname", |c| &c.nickname, |c| &mut c.nickname);
        s.field("window", |c| &c.window, |c| &mut c.window);
        s.field("network", |c| &c.network, |c| &mut c.network);
        s.field("tags", |c| &c.tags, |c| &mut c.tags);
    }

    fn changed(&self) {
        self.changes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_reload(&mut self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runtime settings rooted at `dir`.
pub fn settings(dir: &Path, watch_files: bool) -> RuntimeSettings {
    RuntimeSettings {
        watch_files,
        shutdown_timeout_ms: 2_000,
        ..RuntimeSettings::with_data_dir(dir)
    }
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Replaces `path` the way an editor would: write a sibling, then rename.
pub fn write_external(path: &Path, text: &str) {
    let staging = path.with_extension("edit");
    std::fs::write(&staging, text).unwrap();
    std::fs::rename(&staging, path).unwrap();
}

pub fn init_logging() {
    config_store::observability::logging::init_test();
}

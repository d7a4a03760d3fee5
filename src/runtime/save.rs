//! The save thread.
//!
//! Waits on every root's change signal plus the "config set changed" signal
//! and saves whichever config's store completed a transaction.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::store::ChangeSignal;

use super::RuntimeInner;

pub(crate) fn spawn(runtime: Weak<RuntimeInner>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("config-save".to_string())
        .spawn(move || run(runtime))
}

/// Index 0 is the config set signal; index `i` is `configs[i - 1]`.
fn watch_list(runtime: &RuntimeInner) -> (Vec<Arc<ChangeSignal>>, Vec<Arc<Config>>) {
    let mut signals = vec![Arc::clone(&runtime.configs_changed)];
    let mut configs = Vec::new();
    for config in runtime.configs.load().iter() {
        if let Some(signal) = config.change_signal() {
            signals.push(signal);
            configs.push(Arc::clone(config));
        }
    }
    (signals, configs)
}

fn run(runtime: Weak<RuntimeInner>) {
    let Some(inner) = runtime.upgrade() else {
        return;
    };
    let hub = Arc::clone(&inner.hub);
    let (mut signals, mut configs) = watch_list(&inner);
    drop(inner);

    tracing::debug!("Config save thread started");

    loop {
        let Some(inner) = runtime.upgrade() else {
            break;
        };
        let stop = Arc::clone(&inner.save_stop);
        drop(inner);

        let Some(idx) = hub.wait_any(&signals, &stop) else {
            break;
        };

        if idx == 0 {
            let Some(inner) = runtime.upgrade() else {
                break;
            };
            (signals, configs) = watch_list(&inner);
            tracing::debug!(configs = configs.len(), "Save thread watch list rebuilt");
            continue;
        }

        let config = &configs[idx - 1];
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| config.save()));
        match outcome {
            Ok(Ok(())) => {}
            // Already logged; the next change retries.
            Ok(Err(_)) => {}
            Err(_) => tracing::error!(config = %config.name(), "Config save panicked"),
        }

        if stop.load(Ordering::Acquire) {
            break;
        }
    }

    tracing::debug!("Config save thread exiting");
}

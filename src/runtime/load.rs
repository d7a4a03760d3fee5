//! The load scheduler: one thread, loads strictly one at a time.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, Notify};

use crate::config::{Config, ConfigError};

#[derive(Default)]
struct LoadState {
    result: Mutex<Option<Result<(), ConfigError>>>,
    done: Condvar,
    notify: Notify,
}

impl LoadState {
    fn finish(&self, result: Result<(), ConfigError>) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(result);
        }
        drop(slot);
        self.done.notify_all();
        self.notify.notify_one();
    }

    fn try_take(&self) -> Option<Result<(), ConfigError>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Completion handle of a queued load.
#[must_use = "a load handle does nothing unless waited on"]
pub struct LoadHandle {
    state: Arc<LoadState>,
}

impl LoadHandle {
    /// Blocks the current thread until the load ran.
    pub fn wait(self) -> Result<(), ConfigError> {
        let mut slot = self.state.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            slot = self.state.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Resolves once the load ran.
    pub async fn finished(self) -> Result<(), ConfigError> {
        loop {
            if let Some(result) = self.state.try_take() {
                return result;
            }
            self.state.notify.notified().await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Sending side of a [`LoadHandle`]. Dropping it unfinished cancels the load.
struct Completion {
    state: Arc<LoadState>,
}

impl Completion {
    fn pair() -> (Self, LoadHandle) {
        let state = Arc::new(LoadState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            LoadHandle { state },
        )
    }

    fn finish(self, result: Result<(), ConfigError>) {
        self.state.finish(result);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.state.finish(Err(ConfigError::LoadCancelled));
    }
}

struct LoadJob {
    config: Arc<Config>,
    completion: Completion,
}

impl LoadJob {
    fn run(self) {
        let config = Arc::clone(&self.config);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| config.perform_load()));
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(config = %config.name(), "Config load panicked");
                Err(ConfigError::LoadCancelled)
            }
        };
        self.completion.finish(result);
    }
}

/// Queue in front of the load thread.
pub(crate) struct LoadScheduler {
    tx: Mutex<Option<mpsc::UnboundedSender<LoadJob>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LoadScheduler {
    pub fn start() -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<LoadJob>();
        let thread = thread::Builder::new()
            .name("config-load".to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job.run();
                }
                tracing::debug!("Config load thread exiting");
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queues a load of `config`.
    pub fn submit(&self, config: Arc<Config>) -> Result<LoadHandle, ConfigError> {
        let (completion, handle) = Completion::pair();
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = tx.as_ref().ok_or(ConfigError::RuntimeStopped)?;
        tx.send(LoadJob { config, completion })
            .map_err(|_| ConfigError::RuntimeStopped)?;
        Ok(handle)
    }

    /// Closes the queue, lets queued loads finish and joins the thread.
    pub fn drain(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(thread) = thread {
            if thread.thread().id() == thread::current().id() {
                tracing::warn!("Load thread cannot drain itself, skipping join");
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Config load thread panicked");
            }
        }
    }
}

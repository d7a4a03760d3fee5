//! Auto-reset change signals and the multiplexer the save thread waits on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};

/// Set by a completed outermost transaction, consumed by the save thread.
#[derive(Default)]
pub struct ChangeSignal {
    flag: AtomicBool,
    hub: OnceLock<Arc<SignalHub>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        if let Some(hub) = self.hub.get() {
            hub.notify();
        }
    }

    /// Consumes the signal; `true` if it was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Routes future `set` calls to `hub`. Only the first hub is kept.
    pub fn attach(&self, hub: Arc<SignalHub>) {
        if self.hub.set(Arc::clone(&hub)).is_ok() && self.is_set() {
            hub.notify();
        }
    }
}

/// Wakes a waiter when any attached signal is set.
#[derive(Default)]
pub struct SignalHub {
    gate: Mutex<u64>,
    cv: Condvar,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut generation = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.cv.notify_all();
    }

    /// Blocks until one of `signals` is set and returns its index, consuming it.
    ///
    /// Returns `None` once `stop` is observed. Callers set `stop` and then call
    /// [`notify`](Self::notify).
    pub fn wait_any(&self, signals: &[Arc<ChangeSignal>], stop: &AtomicBool) -> Option<usize> {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(idx) = signals.iter().position(|signal| signal.take()) {
                return Some(idx);
            }
            gate = self.cv.wait(gate).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_signal_auto_resets() {
        let signal = ChangeSignal::new();
        signal.set();
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn test_wait_any_wakes_on_set() {
        let hub = Arc::new(SignalHub::new());
        let signals: Vec<_> = (0..3).map(|_| Arc::new(ChangeSignal::new())).collect();
        for signal in &signals {
            signal.attach(Arc::clone(&hub));
        }

        let setter = {
            let signal = Arc::clone(&signals[2]);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.set();
            })
        };

        let stop = AtomicBool::new(false);
        assert_eq!(hub.wait_any(&signals, &stop), Some(2));
        setter.join().unwrap();
        assert!(!signals[2].is_set());
    }

    #[test]
    fn test_wait_any_stops() {
        let hub = Arc::new(SignalHub::new());
        let stop = Arc::new(AtomicBool::new(false));

        let waiter = {
            let hub = Arc::clone(&hub);
            let stop = Arc::clone(&stop);
            thread::spawn(move || hub.wait_any(&[], &stop))
        };

        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        hub.notify();
        assert_eq!(waiter.join().unwrap(), None);
    }
}

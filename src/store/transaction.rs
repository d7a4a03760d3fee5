use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::lock::TxLock;
use super::signal::ChangeSignal;
use super::StoreLink;

/// Concurrency state shared by every store of one tree. Owned by the root.
pub struct RootState {
    pub(crate) lock: TxLock,
    entered: AtomicUsize,
    signal: Arc<ChangeSignal>,
    quiet: AtomicBool,
    hooks: OnceLock<Weak<dyn StoreLink>>,
}

impl RootState {
    pub(crate) fn new() -> Self {
        Self {
            lock: TxLock::default(),
            entered: AtomicUsize::new(0),
            signal: Arc::new(ChangeSignal::new()),
            quiet: AtomicBool::new(false),
            hooks: OnceLock::new(),
        }
    }

    pub(crate) fn bind(&self, root: Weak<dyn StoreLink>) {
        let _ = self.hooks.set(root);
    }

    pub fn signal(&self) -> &Arc<ChangeSignal> {
        &self.signal
    }

    pub fn lock_cycles(&self) -> usize {
        self.lock.write_cycles()
    }

    fn complete(&self) {
        let quiet = self.quiet.swap(false, Ordering::AcqRel);
        if let Some(root) = self.hooks.get().and_then(Weak::upgrade) {
            root.notify_changed();
        }
        if !quiet {
            self.signal.set();
        }
    }
}

/// Scoped write access to a store tree.
///
/// Nested transactions on the same thread collapse into the outermost one,
/// which alone takes and releases the root lock. Dropping the outermost
/// transaction runs `Changed()` and sets the root's change signal.
#[must_use = "dropping the transaction ends it immediately"]
pub struct ChangeTransaction {
    root: Option<Arc<RootState>>,
    owns_lock: bool,
}

impl ChangeTransaction {
    pub(crate) fn begin(root: Option<Arc<RootState>>) -> Self {
        let owns_lock = match &root {
            Some(state) if !state.lock.is_write_held_by_current() => {
                state.lock.lock_write();
                true
            }
            _ => false,
        };
        if let Some(state) = &root {
            state.entered.fetch_add(1, Ordering::AcqRel);
        }
        Self { root, owns_lock }
    }

    /// Keeps this tree's save signal unset when the outermost transaction ends.
    pub fn skip_save_signal(&self) {
        if let Some(state) = &self.root {
            state.quiet.store(true, Ordering::Release);
        }
    }

    pub fn is_outermost(&self) -> bool {
        self.owns_lock
    }
}

impl Drop for ChangeTransaction {
    fn drop(&mut self) {
        let Some(state) = self.root.take() else {
            return;
        };
        let remaining = state.entered.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if self.owns_lock {
            state.lock.unlock_write();
        }
        if remaining == 0 {
            state.complete();
        }
    }
}

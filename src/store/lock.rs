//! Reader-writer lock owned by the root of a store tree.
//!
//! Differs from `std::sync::RwLock` in two ways: the write side is held by
//! a thread rather than a guard, so nested transactions on the same thread
//! can see that the lock is already theirs, and a thread that holds the write
//! side skips read acquisition.
//!
//! Upgrading is not supported: a thread holding a read side that asks for
//! the write side panics instead of waiting on itself forever.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct LockState {
    /// One entry per outstanding read hold.
    readers: Vec<ThreadId>,
    writer: Option<ThreadId>,
}

#[derive(Default)]
pub(crate) struct TxLock {
    state: Mutex<LockState>,
    cv: Condvar,
    write_cycles: AtomicUsize,
}

impl TxLock {
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_write_held_by_current(&self) -> bool {
        self.state().writer == Some(thread::current().id())
    }

    /// Takes a read hold unless the current thread is the writer.
    pub fn read(&self) -> ReadGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state();
        if state.writer == Some(me) {
            return ReadGuard { lock: None };
        }
        while state.writer.is_some() {
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.readers.push(me);
        ReadGuard { lock: Some(self) }
    }

    /// Takes the write side for the current thread.
    ///
    /// # Panics
    /// When the current thread already holds a read side of this lock.
    pub fn lock_write(&self) {
        let me = thread::current().id();
        let mut state = self.state();
        if state.readers.contains(&me) {
            drop(state);
            panic!("store written while the same thread holds a read of its tree");
        }
        while state.writer.is_some() || !state.readers.is_empty() {
            state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.writer = Some(me);
        self.write_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unlock_write(&self) {
        let mut state = self.state();
        state.writer = None;
        drop(state);
        self.cv.notify_all();
    }

    fn unlock_read(&self) {
        let me = thread::current().id();
        let mut state = self.state();
        if let Some(pos) = state.readers.iter().position(|id| *id == me) {
            state.readers.swap_remove(pos);
        } else {
            state.readers.pop();
        }
        let idle = state.readers.is_empty();
        drop(state);
        if idle {
            self.cv.notify_all();
        }
    }

    /// Number of times the write side has been acquired.
    pub fn write_cycles(&self) -> usize {
        self.write_cycles.load(Ordering::Relaxed)
    }
}

pub(crate) struct ReadGuard<'a> {
    lock: Option<&'a TxLock>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock {
            lock.unlock_read();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_writer_skips_read() {
        let lock = TxLock::default();
        lock.lock_write();
        assert!(lock.is_write_held_by_current());
        {
            let guard = lock.read();
            assert!(guard.lock.is_none());
        }
        lock.unlock_write();
        assert!(!lock.is_write_held_by_current());
        assert_eq!(lock.write_cycles(), 1);
    }

    #[test]
    fn test_writer_waits_for_readers() {
        let lock = Arc::new(TxLock::default());
        let guard = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.lock_write();
                lock.unlock_write();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(lock.write_cycles(), 0);
        drop(guard);
        writer.join().unwrap();
        assert_eq!(lock.write_cycles(), 1);
    }

    #[test]
    #[should_panic(expected = "holds a read")]
    fn test_write_inside_read_panics() {
        let lock = TxLock::default();
        let _guard = lock.read();
        lock.lock_write();
    }

    #[test]
    fn test_other_thread_read_does_not_block_forever() {
        let lock = Arc::new(TxLock::default());
        let reader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.read();
                thread::sleep(Duration::from_millis(20));
            })
        };
        reader.join().unwrap();
        lock.lock_write();
        lock.unlock_write();
        assert_eq!(lock.write_cycles(), 1);
    }
}

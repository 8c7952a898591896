//! In-process path lock table.
//!
//! One slot per contended path, created on demand and dropped as soon as nobody
//! holds or waits on it. Acquisition is two-phase:
//! 1. under the table mutex: look up or insert the slot and register interest
//! 2. table mutex released: block on the slot until it is free
//!
//! The table mutex is only ever held for O(1) map work, so a long-running file
//! operation on one path never stalls bookkeeping for another. A slot is removed
//! only when its interest count drops to zero; a waiter that registered before the
//! holder released therefore always finds the same slot and is always woken.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::Instant;
use tracing::trace;

use super::key::LockKey;

#[derive(Default)]
struct Slot {
    held: Mutex<bool>,
    freed: Condvar,
}

struct Entry {
    slot: Arc<Slot>,
    /// Holder plus waiters. Only mutated under the table mutex.
    interest: usize,
}

/// Path-keyed mutual exclusion for callers inside one process.
#[derive(Default)]
pub struct PathLockTable {
    entries: Mutex<HashMap<LockKey, Entry>>,
}

impl PathLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table, created on first use and never torn down.
    pub fn global() -> Arc<PathLockTable> {
        static GLOBAL: OnceLock<Arc<PathLockTable>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PathLockTable::new())))
    }

    /// Block until the caller exclusively holds `path`.
    /// The returned guard releases on drop, so every exit path unlocks.
    pub fn acquire(&self, path: &Path) -> PathLockGuard<'_> {
        let key = LockKey::new(path);
        let start = Instant::now();

        let slot = {
            let mut entries = self.entries();
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                slot: Arc::new(Slot::default()),
                interest: 0,
            });
            entry.interest += 1;
            Arc::clone(&entry.slot)
        };

        {
            let mut held = lock_ignoring_poison(&slot.held);
            while *held {
                held = slot.freed.wait(held).unwrap_or_else(|p| p.into_inner());
            }
            *held = true;
        }

        let waited = start.elapsed();
        if waited.as_millis() == 0 {
            trace!(path = %key, "path lock acquired immediately");
        } else {
            trace!(path = %key, waited_ms = waited.as_millis() as u64, "path lock acquired after wait");
        }
        PathLockGuard { table: self, key, slot, released: false }
    }

    /// Non-blocking acquire. Returns None when another caller holds `path`.
    pub fn try_acquire(&self, path: &Path) -> Option<PathLockGuard<'_>> {
        let key = LockKey::new(path);
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            slot: Arc::new(Slot::default()),
            interest: 0,
        });
        let slot = Arc::clone(&entry.slot);
        let mut held = lock_ignoring_poison(&slot.held);
        if *held {
            return None;
        }
        *held = true;
        drop(held);
        entry.interest += 1;
        trace!(path = %key, "path lock try-acquire success");
        Some(PathLockGuard { table: self, key, slot, released: false })
    }

    /// Whether `path` currently has a holder or waiters. Racy; diagnostics only.
    pub fn is_locked(&self, path: &Path) -> bool {
        let key = LockKey::new(path);
        self.entries().contains_key(&key)
    }

    /// Number of paths currently held or waited on. Diagnostics only.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &LockKey, slot: &Slot) {
        {
            let mut held = lock_ignoring_poison(&slot.held);
            *held = false;
        }
        slot.freed.notify_one();

        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.interest -= 1;
            if entry.interest == 0 {
                entries.remove(key);
            }
        }
        trace!(path = %key, "path lock released");
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LockKey, Entry>> {
        lock_ignoring_poison(&self.entries)
    }
}

/// Table and slot state is updated in single statements, so a panic in another
/// holder never leaves it half-written.
fn lock_ignoring_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// RAII guard for one held path.
#[must_use = "the path is unlocked as soon as the guard is dropped"]
pub struct PathLockGuard<'a> {
    table: &'a PathLockTable,
    key: LockKey,
    slot: Arc<Slot>,
    released: bool,
}

impl PathLockGuard<'_> {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Release explicitly; equivalent to dropping the guard.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.table.release(&self.key, &self.slot);
        }
    }
}

impl Drop for PathLockGuard<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}

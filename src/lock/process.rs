//! Cross-process advisory locks with leases.
//!
//! Each locked path owns an open handle carrying an OS advisory lock (`flock` on
//! Unix, `LockFileEx` on Windows, via fs2). Acquisition is re-entrant within this
//! process: a second `acquire` on a leased path reuses the handle, extends the
//! lease and counts one more hold. Explicit `release` drops the lease outright;
//! scoped holds taken by guarded operations only give back their own count.
//! A background reaper force-releases leases that were never released
//! explicitly, so a crashed or forgetful caller cannot wedge a path forever. A
//! holder that stalls past its lease can lose it; that is the price of liveness.
//!
//! The lease map mutex is only held for map work. Opening files, sleeping between
//! retries and reading/writing through a handle all happen outside it.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, trace, warn};

use super::key::LockKey;
use crate::classify::{io_err, is_busy};
use crate::errors::{FileGateError, Result};

pub const DEFAULT_LEASE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 7;
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Timing knobs for leases and acquisition retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    /// How long an acquisition stays valid without being refreshed.
    pub lease: Duration,
    /// How often the reaper scans for expired leases.
    pub reap_interval: Duration,
    /// Total lock attempts; the first is immediate.
    pub attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            reap_interval: DEFAULT_REAP_INTERVAL,
            attempts: DEFAULT_LOCK_ATTEMPTS,
            retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }
}

struct Lease {
    file: Arc<File>,
    expires_at: Instant,
    /// Distinguishes this lease from a later one on the same path.
    id: u64,
    holds: usize,
}

/// What `acquire_key` hands out: the shared handle plus which lease it belongs to.
struct Grant {
    file: Arc<File>,
    expires_at: Instant,
    id: u64,
}

impl Lease {
    fn grant(&self) -> Grant {
        Grant { file: Arc::clone(&self.file), expires_at: self.expires_at, id: self.id }
    }
}

struct Shared {
    leases: Mutex<HashMap<LockKey, Lease>>,
    settings: LeaseSettings,
    next_id: AtomicU64,
}

impl Shared {
    fn leases(&self) -> MutexGuard<'_, HashMap<LockKey, Lease>> {
        self.leases.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Refresh `key` and count one more hold on it, if it is already leased.
    fn renew(&self, key: &LockKey) -> Option<Grant> {
        let mut leases = self.leases();
        let lease = leases.get_mut(key)?;
        Some(Self::reenter(lease, self.settings.lease))
    }

    fn reenter(lease: &mut Lease, duration: Duration) -> Grant {
        lease.expires_at = Instant::now() + duration;
        lease.holds += 1;
        lease.grant()
    }

    /// Remove the lease on `key` if it is still lease `id`, or just drop one hold
    /// when `whole` is false and others remain. Returns the lease to unlock.
    fn take(&self, key: &LockKey, id: u64, whole: bool) -> Option<Lease> {
        let mut leases = self.leases();
        let lease = leases.get_mut(key).filter(|l| l.id == id)?;
        if !whole && lease.holds > 1 {
            lease.holds -= 1;
            return None;
        }
        leases.remove(key)
    }

    /// Remove every expired lease and unlock it. Returns how many were reaped.
    fn reap_expired(&self, now: Instant) -> usize {
        let expired: Vec<(LockKey, Lease)> = {
            let mut leases = self.leases();
            let keys: Vec<LockKey> = leases
                .iter()
                .filter(|(_, l)| l.expires_at <= now)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| leases.remove(&k).map(|l| (k, l)))
                .collect()
        };
        for (key, lease) in &expired {
            if let Err(e) = FileExt::unlock(lease.file.as_ref()) {
                warn!(path = %key, error = %e, "failed to unlock expired lease");
            }
            warn!(path = %key, "reaped expired file lock lease");
        }
        expired.len()
    }
}

/// Snapshot of a granted lease.
#[derive(Debug, Clone)]
pub struct LeaseHandle {
    pub key: LockKey,
    pub expires_at: Instant,
}

/// One counted hold on a lease, taken for the length of a single guarded operation.
pub(crate) struct LeaseHold {
    key: LockKey,
    id: u64,
    file: Arc<File>,
}

impl LeaseHold {
    pub(crate) fn read_all(&self) -> Result<Vec<u8>> {
        read_handle(&self.file, &self.key)
    }

    pub(crate) fn replace(&self, data: &[u8]) -> Result<()> {
        write_handle(&self.file, &self.key, data)
    }
}

struct Reaper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Lease-based advisory locks visible to other processes.
pub struct CrossProcessLocks {
    shared: Arc<Shared>,
    reaper: Mutex<Option<Reaper>>,
}

impl CrossProcessLocks {
    /// Create the adapter and start its reaper thread.
    pub fn new(settings: LeaseSettings) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            leases: Mutex::new(HashMap::new()),
            settings,
            next_id: AtomicU64::new(1),
        });
        let (stop, stopped) = mpsc::channel::<()>();
        let worker = Arc::clone(&shared);
        let interval = settings.reap_interval;
        let handle = thread::Builder::new()
            .name("filegate-reaper".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let n = worker.reap_expired(Instant::now());
                            if n > 0 {
                                debug!(reaped = n, "lease reaper pass");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                trace!("lease reaper stopped");
            })?;
        Ok(Self { shared, reaper: Mutex::new(Some(Reaper { stop, handle })) })
    }

    pub fn settings(&self) -> LeaseSettings {
        self.shared.settings
    }

    /// Take (or re-enter) the advisory lock on `path`, creating the file if needed.
    /// Fails with `LockTimeout` once every attempt found the file locked elsewhere.
    pub fn acquire(&self, path: &Path) -> Result<LeaseHandle> {
        let key = LockKey::new(path);
        self.acquire_key(&key, true).map(|g| LeaseHandle { key, expires_at: g.expires_at })
    }

    /// Counted hold for one guarded operation. With `create` false a missing file
    /// fails with `NotFound` instead of being created.
    pub(crate) fn hold(&self, path: &Path, create: bool) -> Result<LeaseHold> {
        let key = LockKey::new(path);
        let grant = self.acquire_key(&key, create)?;
        Ok(LeaseHold { key, id: grant.id, file: grant.file })
    }

    /// Give back one hold. The lock is dropped once nothing else holds the lease.
    pub(crate) fn unhold(&self, hold: LeaseHold) -> Result<()> {
        let taken = self.shared.take(&hold.key, hold.id, false);
        unlock_taken(&hold.key, taken)
    }

    /// Drop the whole lease behind `hold`, whoever else holds it. For paths that no
    /// longer exist after the operation.
    pub(crate) fn forget(&self, hold: LeaseHold) -> Result<()> {
        let taken = self.shared.take(&hold.key, hold.id, true);
        unlock_taken(&hold.key, taken)
    }

    fn acquire_key(&self, key: &LockKey, create: bool) -> Result<Grant> {
        if let Some(found) = self.shared.renew(key) {
            trace!(path = %key, "re-entered leased file lock");
            return Ok(found);
        }

        let path = key.as_path();
        let file = open_lock_handle(path, create).map_err(io_err("open lock handle", path))?;

        let settings = self.shared.settings;
        let attempts = settings.attempts.max(1);
        let start = Instant::now();
        for attempt in 1..=attempts {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    let mut leases = self.shared.leases();
                    // Another thread of ours may have won the race in the meantime.
                    if let Some(lease) = leases.get_mut(key) {
                        let grant = Shared::reenter(lease, settings.lease);
                        drop(leases);
                        if let Err(e) = FileExt::unlock(&file) {
                            warn!(path = %key, error = %e, "failed to unlock duplicate lock handle");
                        }
                        return Ok(grant);
                    }
                    let lease = Lease {
                        file: Arc::new(file),
                        expires_at: Instant::now() + settings.lease,
                        id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
                        holds: 1,
                    };
                    let grant = lease.grant();
                    leases.insert(key.clone(), lease);
                    trace!(
                        path = %key,
                        attempts = attempt,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "file lock acquired"
                    );
                    return Ok(grant);
                }
                Err(e) if is_contended(&e) => {
                    if let Some(found) = self.shared.renew(key) {
                        return Ok(found);
                    }
                    debug!(path = %key, attempt, "file locked elsewhere");
                    if attempt < attempts {
                        thread::sleep(settings.retry_delay);
                    }
                }
                Err(e) => return Err(io_err("lock", path)(e)),
            }
        }

        warn!(path = %key, attempts, "giving up on file lock");
        Err(FileGateError::LockTimeout { path: path.to_path_buf(), attempts })
    }

    /// Acquire (or re-enter) and read the whole file through the leased handle.
    /// The lease stays held afterwards; release is the caller's job or the reaper's.
    pub fn read_through(&self, path: &Path) -> Result<Vec<u8>> {
        let key = LockKey::new(path);
        let grant = self.acquire_key(&key, true)?;
        read_handle(&grant.file, &key)
    }

    /// Acquire (or re-enter) and replace the file contents through the leased handle.
    /// The lease stays held afterwards.
    pub fn write_through(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = LockKey::new(path);
        let grant = self.acquire_key(&key, true)?;
        write_handle(&grant.file, &key, data)
    }

    /// Drop the lease on `path` immediately. Releasing an unleased path is a no-op.
    pub fn release(&self, path: &Path) -> Result<()> {
        let key = LockKey::new(path);
        let removed = self.shared.leases().remove(&key);
        if let Some(lease) = removed {
            FileExt::unlock(lease.file.as_ref()).map_err(io_err("unlock", key.as_path()))?;
            trace!(path = %key, "file lock released");
        }
        Ok(())
    }

    /// Drop every lease this process holds.
    pub fn release_all(&self) -> Result<()> {
        let drained: Vec<(LockKey, Lease)> = self.shared.leases().drain().collect();
        let mut first_err = None;
        for (key, lease) in drained {
            if let Err(e) = FileExt::unlock(lease.file.as_ref()) {
                warn!(path = %key, error = %e, "failed to unlock during release_all");
                if first_err.is_none() {
                    first_err = Some(io_err("unlock", key.as_path())(e));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Whether this process holds a lease on `path`. Diagnostics only.
    pub fn is_locked(&self, path: &Path) -> bool {
        self.shared.leases().contains_key(&LockKey::new(path))
    }

    /// Number of leases this process currently holds.
    pub fn len(&self) -> usize {
        self.shared.leases().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one reaper pass now. Returns how many leases were reclaimed.
    pub fn reap_now(&self) -> usize {
        self.shared.reap_expired(Instant::now())
    }

    /// Stop the reaper thread. Held leases stay held until released or dropped.
    /// Idempotent.
    pub fn shutdown(&self) {
        let reaper = self.reaper.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(Reaper { stop, handle }) = reaper {
            let _ = stop.send(());
            if handle.join().is_err() {
                warn!("lease reaper thread panicked");
            }
        }
    }
}

impl Drop for CrossProcessLocks {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read/write when possible. An existing file we may only read is still lockable.
fn open_lock_handle(path: &Path, create: bool) -> io::Result<File> {
    let rw = OpenOptions::new().read(true).write(true).create(create).truncate(false).open(path);
    match rw {
        Err(e) if !create && e.kind() == io::ErrorKind::PermissionDenied => {
            OpenOptions::new().read(true).open(path)
        }
        other => other,
    }
}

fn read_handle(file: &File, key: &LockKey) -> Result<Vec<u8>> {
    let mut handle = file;
    let mut data = Vec::new();
    handle
        .seek(SeekFrom::Start(0))
        .and_then(|_| handle.read_to_end(&mut data))
        .map_err(io_err("read", key.as_path()))?;
    Ok(data)
}

fn write_handle(file: &File, key: &LockKey, data: &[u8]) -> Result<()> {
    let mut handle = file;
    handle
        .set_len(0)
        .and_then(|_| handle.seek(SeekFrom::Start(0)))
        .and_then(|_| handle.write_all(data))
        .and_then(|_| handle.sync_data())
        .map_err(io_err("write", key.as_path()))
}

fn unlock_taken(key: &LockKey, taken: Option<Lease>) -> Result<()> {
    if let Some(lease) = taken {
        FileExt::unlock(lease.file.as_ref()).map_err(io_err("unlock", key.as_path()))?;
        trace!(path = %key, "file lock released");
    }
    Ok(())
}

fn is_contended(e: &io::Error) -> bool {
    match (e.raw_os_error(), fs2::lock_contended_error().raw_os_error()) {
        (Some(code), Some(contended)) if code == contended => true,
        _ => e.kind() == io::ErrorKind::WouldBlock || is_busy(e),
    }
}

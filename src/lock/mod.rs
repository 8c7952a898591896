//! Locking primitives.
//!
//! - `table`: in-process, path-keyed mutual exclusion used by every guarded operation
//! - `process`: lease-based OS advisory locks visible to other processes
//! - `key`: canonical lock keys shared by both

mod key;
mod process;
mod table;

pub use key::LockKey;
pub use process::{
    CrossProcessLocks, DEFAULT_LEASE, DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_RETRY_DELAY,
    DEFAULT_REAP_INTERVAL, LeaseHandle, LeaseSettings,
};
pub(crate) use process::LeaseHold;
pub use table::{PathLockGuard, PathLockTable};

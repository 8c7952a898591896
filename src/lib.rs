//! Core library for `filegate`.
//!
//! Serialized access to files shared between concurrent callers in one process and,
//! with leases, across processes:
//! - `lock`: path lock table, cross-process advisory leases with a reaper
//! - `fs_ops`: read/write/copy/rename/remove guarded by those locks
//! - `classify` and `errors`: one taxonomy for "file busy" failures from any OS
//! - `walk`: directory enumeration, natively or through a loopback helper
//! - `config`, `policy`: runtime settings and what to do on unrecoverable errors
//!
//! Typical embedding:
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use filegate::{GuardedFs, PathLockTable};
//!
//! let files = GuardedFs::new(Arc::new(PathLockTable::new()));
//! files.write_file(Path::new("/data/notes.sy"), b"hello")?;
//! let body = files.read_file(Path::new("/data/notes.sy"))?;
//! # Ok::<(), filegate::FileGateError>(())
//! ```

pub mod classify;
pub mod config;
pub mod errors;
pub mod fs_ops;
pub mod lock;
pub mod output;
pub mod platform;
pub mod policy;
pub mod shutdown;
pub mod walk;

pub use classify::{ErrorClass, classify, is_busy, wrap_io};
pub use config::{Config, LogLevel, WalkMode, default_log_path, load_config, path_has_symlink_ancestor};
pub use errors::{FileGateError, Result};
pub use fs_ops::GuardedFs;
pub use lock::{CrossProcessLocks, LeaseHandle, LeaseSettings, LockKey, PathLockGuard, PathLockTable};
pub use policy::{Disposition, EXIT_FAILURE, EXIT_FILESYSTEM_ERROR, EXIT_OK, ErrorPolicy};
pub use walk::{FileEntry, WalkControl, WalkOutcome, WalkSource, WalkStrategy, Walker};

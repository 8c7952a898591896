//! Typed error definitions for filegate.
//!
//! `UnableAccess` is the sentinel for lock contention: callers test for it with
//! [`FileGateError::is_unable_access`] instead of matching on locale-specific text.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::platform::os_code_hint;

pub type Result<T> = std::result::Result<T, FileGateError>;

#[derive(Debug, Error)]
pub enum FileGateError {
    /// The target is busy (held by another handle/process) or access was denied.
    #[error("unable to access file: {}", describe(.op, .path, .source))]
    UnableAccess {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cross-process advisory lock could not be obtained within the retry budget.
    #[error("unable to lock file '{}' after {} attempts", .path.display(), .attempts)]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// Any other OS failure, passed through with context.
    #[error("{}", describe(.op, .path, .source))]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk '{}' failed: {}", .root.display(), .source)]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A walk callback returned an error; the walk stopped.
    #[error("walk callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FileGateError {
    /// True when this is the busy/denied sentinel.
    pub fn is_unable_access(&self) -> bool {
        matches!(self, FileGateError::UnableAccess { .. })
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, FileGateError::LockTimeout { .. })
    }

    /// Underlying OS error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            FileGateError::UnableAccess { source, .. } | FileGateError::Io { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Path the failed operation was working on, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileGateError::UnableAccess { path, .. }
            | FileGateError::Io { path, .. }
            | FileGateError::LockTimeout { path, .. } => Some(path),
            FileGateError::Walk { root, .. } => Some(root),
            _ => None,
        }
    }
}

/// Message for an OS failure, with a hint and the raw code appended when known.
fn describe(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);
    if let Some(code) = e.raw_os_error() {
        if let Some(hint) = os_code_hint(code) {
            msg.push_str(" — ");
            msg.push_str(hint);
        }
        msg.push_str(&format!(" [os code: {code}]"));
    } else {
        let hint = match e.kind() {
            io::ErrorKind::PermissionDenied => Some("permission denied; check ownership and write permissions"),
            io::ErrorKind::NotFound => Some("path not found; verify it exists"),
            io::ErrorKind::AlreadyExists => Some("already exists; remove or choose a unique name"),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Some("busy/timed out; retry after the current holder finishes")
            }
            _ => None,
        };
        if let Some(hint) = hint {
            msg.push_str(" — ");
            msg.push_str(hint);
        }
    }
    msg
}

//! Error classification.
//!
//! Maps raw OS failures into a small taxonomy so every guarded operation reports
//! lock contention the same way. Structured information (raw OS code, `ErrorKind`)
//! is consulted first; a case-insensitive text match is the last resort for OS
//! layers that report sharing violations without a usable code. That text match is
//! locale dependent and only recognises English messages.

use std::io;
use std::path::Path;

use crate::errors::FileGateError;
use crate::platform::{is_busy_os_code, is_denied_os_code};

const BUSY_PHRASES: &[&str] = &["used by another process", "resource busy", "text file busy"];
const DENIED_PHRASES: &[&str] = &["access is denied", "permission denied"];

/// Classification of an operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No error.
    Ok,
    /// Target held open by another handle or process.
    Busy,
    /// Permission denied.
    Denied,
    /// Anything else; passed through unchanged.
    Other,
}

impl ErrorClass {
    /// Busy and denied both mean "could not get at the file right now".
    pub fn is_unable_access(self) -> bool {
        matches!(self, ErrorClass::Busy | ErrorClass::Denied)
    }
}

/// Classify an optional OS error.
pub fn classify(err: Option<&io::Error>) -> ErrorClass {
    let Some(err) = err else {
        return ErrorClass::Ok;
    };

    if let Some(code) = err.raw_os_error() {
        if is_busy_os_code(code) {
            return ErrorClass::Busy;
        }
        if is_denied_os_code(code) {
            return ErrorClass::Denied;
        }
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => return ErrorClass::Denied,
        io::ErrorKind::ResourceBusy => return ErrorClass::Busy,
        _ => {}
    }

    let msg = err.to_string().to_lowercase();
    if BUSY_PHRASES.iter().any(|p| msg.contains(p)) {
        ErrorClass::Busy
    } else if DENIED_PHRASES.iter().any(|p| msg.contains(p)) {
        ErrorClass::Denied
    } else {
        ErrorClass::Other
    }
}

/// Shorthand for `classify(Some(err)).is_unable_access()`.
pub fn is_busy(err: &io::Error) -> bool {
    classify(Some(err)).is_unable_access()
}

/// Wrap an OS error from `op` on `path`: busy/denied become the
/// `UnableAccess` sentinel, everything else passes through as `Io`.
pub fn wrap_io(op: &'static str, path: &Path, source: io::Error) -> FileGateError {
    let path = path.to_path_buf();
    if is_busy(&source) {
        FileGateError::UnableAccess { op, path, source }
    } else {
        FileGateError::Io { op, path, source }
    }
}

/// Adapter for `.map_err(...)`.
pub(crate) fn io_err<'a>(
    op: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> FileGateError + 'a {
    move |e| wrap_io(op, path, e)
}

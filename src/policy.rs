//! What to do when a guarded operation hits a busy/denied file.
//!
//! Desktop embedders usually want the error back so they can retry or tell the
//! user. Mobile embedders may prefer to stop the process outright rather than
//! keep running on a filesystem they can no longer trust. The library never
//! decides this on its own; the embedding application picks a policy.

use std::fmt;
use std::str::FromStr;
use tracing::error;

use crate::errors::FileGateError;

/// Successful execution.
pub const EXIT_OK: i32 = 0;

/// Generic failure (bad arguments, unexpected error).
pub const EXIT_FAILURE: i32 = 1;

/// Unrecoverable filesystem error under the terminate policy.
pub const EXIT_FILESYSTEM_ERROR: i32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the wrapped error to the caller.
    #[default]
    Propagate,
    /// Log and exit the process with `exit_code`.
    Terminate { exit_code: i32 },
}

/// Outcome of applying a policy to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Return,
    Exit(i32),
}

impl ErrorPolicy {
    pub const fn terminate() -> Self {
        ErrorPolicy::Terminate { exit_code: EXIT_FILESYSTEM_ERROR }
    }

    /// Policy default for the compile target: terminate on Android/iOS,
    /// propagate elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "android", target_os = "ios")) {
            Self::terminate()
        } else {
            Self::Propagate
        }
    }

    /// Pure decision; only busy/denied errors are ever fatal. Lock timeouts are
    /// transient contention and always go back to the caller.
    pub fn disposition(&self, err: &FileGateError) -> Disposition {
        match self {
            ErrorPolicy::Terminate { exit_code } if err.is_unable_access() => {
                Disposition::Exit(*exit_code)
            }
            _ => Disposition::Return,
        }
    }

    /// Apply the policy: hand the error back, or log it and exit.
    pub fn enforce(&self, err: FileGateError) -> FileGateError {
        match self.disposition(&err) {
            Disposition::Return => err,
            Disposition::Exit(code) => {
                error!(error = %err, exit_code = code, "unrecoverable filesystem error; exiting");
                std::process::exit(code)
            }
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Propagate => f.write_str("propagate"),
            ErrorPolicy::Terminate { .. } => f.write_str("terminate"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" | "continue" | "return" => Ok(ErrorPolicy::Propagate),
            "terminate" | "exit" | "strict" => Ok(ErrorPolicy::terminate()),
            other => Err(format!("invalid error policy: '{other}'")),
        }
    }
}

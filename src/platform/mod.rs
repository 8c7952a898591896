//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the classifier and the guarded operations can remain platform-agnostic.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

pub(crate) use temp::tmp_sibling_name;

#[cfg(unix)]
pub use unix::{
    fsync_dir, is_busy_os_code, is_cross_device_os_code, is_denied_os_code,
    open_log_file_secure_append, os_code_hint, write_safer,
};

#[cfg(not(unix))]
pub use windows::{
    fsync_dir, is_busy_os_code, is_cross_device_os_code, is_denied_os_code,
    open_log_file_secure_append, os_code_hint, write_safer,
};

//! Windows implementations of platform helpers.
//!
//! Notes:
//! - Windows lacks POSIX mode semantics; no ACL management is attempted.
//! - Sharing and lock violations are how Windows reports a file held open elsewhere.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use windows_sys::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_DISK_FULL, ERROR_FILE_EXISTS, ERROR_FILE_NOT_FOUND,
    ERROR_FILENAME_EXCED_RANGE, ERROR_LOCK_VIOLATION, ERROR_NOT_SAME_DEVICE,
    ERROR_PATH_NOT_FOUND, ERROR_SHARING_VIOLATION, ERROR_WRITE_PROTECT,
};

use super::temp::tmp_sibling_name;

pub fn is_busy_os_code(code: i32) -> bool {
    code == ERROR_SHARING_VIOLATION as i32 || code == ERROR_LOCK_VIOLATION as i32
}

pub fn is_denied_os_code(code: i32) -> bool {
    code == ERROR_ACCESS_DENIED as i32
}

pub fn is_cross_device_os_code(code: i32) -> bool {
    code == ERROR_NOT_SAME_DEVICE as i32
}

pub fn os_code_hint(code: i32) -> Option<&'static str> {
    let code = code as u32;
    let hint = match code {
        ERROR_ACCESS_DENIED => "access denied; check permissions",
        ERROR_SHARING_VIOLATION => "sharing violation; file is in use by another process",
        ERROR_LOCK_VIOLATION => "lock violation; another process has locked a region",
        ERROR_NOT_SAME_DEVICE => "not same device; cross-filesystem move",
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => "path not found; verify it exists",
        ERROR_FILE_EXISTS => "already exists; pick a unique name",
        ERROR_DISK_FULL => "insufficient disk space",
        ERROR_WRITE_PROTECT => "write protected / read-only media",
        ERROR_FILENAME_EXCED_RANGE => "filename or path too long",
        _ => return None,
    };
    Some(hint)
}

/// Open log file for appending (no symlink defense available via std on Windows).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Stream `reader` into a temp sibling, fsync, then rename over `path`.
/// `fs::rename` maps to MoveFileExW with MOVEFILE_REPLACE_EXISTING.
pub fn write_safer(path: &Path, reader: &mut dyn Read) -> io::Result<u64> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = tmp_sibling_name(path);
    let result = (|| -> io::Result<u64> {
        let f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        let mut writer = BufWriter::new(f);
        let bytes = io::copy(reader, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&tmp, path)?;
        Ok(bytes)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Directory fsync is not supported through std on Windows.
pub fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

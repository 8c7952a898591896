//! Unix (Linux, macOS, Android, iOS) implementations of platform helpers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use super::temp::tmp_sibling_name;

/// Mode applied to files produced by `write_safer`.
const FILE_MODE: u32 = 0o644;

/// errno values meaning another handle or process is holding the target.
pub fn is_busy_os_code(code: i32) -> bool {
    code == libc::EBUSY || code == libc::ETXTBSY || code == libc::EWOULDBLOCK || code == libc::EAGAIN
}

/// errno values meaning the caller lacks permission.
pub fn is_denied_os_code(code: i32) -> bool {
    code == libc::EACCES || code == libc::EPERM
}

pub fn is_cross_device_os_code(code: i32) -> bool {
    code == libc::EXDEV
}

/// Short actionable hint for common errno values.
pub fn os_code_hint(code: i32) -> Option<&'static str> {
    let hint = match code {
        libc::EACCES | libc::EPERM => "permission denied; check ownership and write permissions",
        libc::EBUSY => "resource busy; another process is holding the file",
        libc::ETXTBSY => "text file busy; the file is being executed or mapped",
        libc::EXDEV => "cross-filesystem; atomic rename not possible",
        libc::ENOENT => "path not found; verify it exists",
        libc::EEXIST => "already exists; pick a unique name or remove the target",
        libc::ENOSPC => "insufficient space on device",
        libc::EROFS => "read-only filesystem; cannot write here",
        libc::ENOTEMPTY => "directory not empty",
        libc::ELOOP => "too many symbolic link levels; possible symlink cycle",
        libc::ENAMETOOLONG => "filename or path too long",
        libc::EMFILE => "process file descriptor limit reached",
        libc::ENFILE => "system-wide file table overflow",
        _ => return None,
    };
    Some(hint)
}

/// Open log file for appending; set 0600 only when creating a new file.
/// An existing file keeps its mode so administrator adjustments survive.
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

/// Stream `reader` into `path` without ever exposing a partially written file:
/// - create a hidden temp sibling (O_EXCL, 0644)
/// - copy, fsync, rename over `path`, fsync the parent directory
/// - on failure the temp file is removed best-effort
///
/// Returns the number of bytes written.
pub fn write_safer(path: &Path, reader: &mut dyn Read) -> io::Result<u64> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let tmp = tmp_sibling_name(path);
    let result = (|| -> io::Result<u64> {
        let f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(&tmp)?;
        let mut writer = BufWriter::new(f);
        let bytes = io::copy(reader, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        // umask may have stripped bits at create time.
        fs::set_permissions(&tmp, fs::Permissions::from_mode(FILE_MODE))?;
        fs::rename(&tmp, path)?;
        Ok(bytes)
    })();

    match result {
        Ok(bytes) => {
            let _ = fsync_dir(parent);
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn preserve_existing_log_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640, "existing permissions should be preserved");
    }

    #[test]
    fn new_log_file_gets_0600() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new_log.txt");
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn write_safer_replaces_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, b"old").unwrap();

        let n = write_safer(&path, &mut &b"{\"v\":2}"[..]).unwrap();
        assert_eq!(n, 7);
        assert_eq!(fs::read(&path).unwrap(), b"{\"v\":2}");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);

        for entry in fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            let name = name.to_string_lossy();
            assert!(!name.starts_with(".filegate."), "leftover temp file: {name}");
        }
    }

    #[test]
    fn code_tables_are_disjoint() {
        assert!(is_busy_os_code(libc::EBUSY));
        assert!(is_denied_os_code(libc::EACCES));
        assert!(!is_busy_os_code(libc::ENOENT));
        assert!(!is_denied_os_code(libc::ENOENT));
        assert!(is_cross_device_os_code(libc::EXDEV));
        assert!(os_code_hint(libc::ENOSPC).unwrap().contains("space"));
    }
}

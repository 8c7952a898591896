//! Rename/move.
//!
//! Directory onto an existing directory merges: the source tree is copied into
//! the destination, then removed. Everything else is a plain `rename`, with a
//! copy + remove fallback when source and destination sit on different devices.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use super::copy::{copy_file, copy_tree};
use crate::classify::{io_err, wrap_io};
use crate::errors::{FileGateError, Result};
use crate::lock::LockKey;
use crate::platform::is_cross_device_os_code;

pub(super) fn move_path(src: &Path, dest: &Path) -> Result<()> {
    let src_meta = fs::symlink_metadata(src).map_err(io_err("rename", src))?;
    let src_key = LockKey::new(src);
    let dest_key = LockKey::new(dest);
    if src_key == dest_key {
        debug!(path = %src.display(), "rename onto itself; nothing to do");
        return Ok(());
    }

    if src_meta.is_dir() {
        if dest_key.as_path().starts_with(src_key.as_path()) {
            return Err(FileGateError::Io {
                op: "rename",
                path: dest.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "destination is inside the source directory",
                ),
            });
        }
        if fs::metadata(dest).is_ok_and(|m| m.is_dir()) {
            copy_tree(src, dest, false)?;
            fs::remove_dir_all(src).map_err(io_err("remove merged source", src))?;
            info!(src = %src.display(), dest = %dest.display(), "merged directory into existing destination");
            return Ok(());
        }
    }

    match fs::rename(src, dest) {
        Ok(()) => {
            debug!(src = %src.display(), dest = %dest.display(), "renamed");
            Ok(())
        }
        Err(e) if e.raw_os_error().is_some_and(is_cross_device_os_code) => {
            debug!(src = %src.display(), dest = %dest.display(), "cross-device rename; copying instead");
            if src_meta.is_dir() {
                copy_tree(src, dest, true)?;
                fs::remove_dir_all(src).map_err(io_err("remove moved source", src))?;
            } else {
                copy_file(src, dest, true)?;
                fs::remove_file(src).map_err(io_err("remove moved source", src))?;
            }
            info!(src = %src.display(), dest = %dest.display(), "moved across devices via copy");
            Ok(())
        }
        Err(e) => Err(wrap_io("rename", src, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directory_into_itself_is_rejected() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        fs::create_dir(&a).unwrap();
        let err = move_path(&a, &a.join("inner")).unwrap_err();
        assert_eq!(err.io_error().map(|e| e.kind()), Some(io::ErrorKind::InvalidInput));
        assert!(a.exists());
    }

    #[test]
    fn same_path_is_noop() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("f.txt");
        fs::write(&f, b"x").unwrap();
        move_path(&f, &dir.path().join(".").join("f.txt")).unwrap();
        assert_eq!(fs::read(&f).unwrap(), b"x");
    }

    #[test]
    fn missing_source_passes_through_not_found() {
        let dir = tempdir().unwrap();
        let err = move_path(&dir.path().join("nope"), &dir.path().join("b")).unwrap_err();
        assert!(!err.is_unable_access());
        assert_eq!(err.io_error().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }
}

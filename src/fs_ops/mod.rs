//! Guarded file operations.
//!
//! Every operation takes the path lock for its primary path (the source, for copy and
//! rename) before touching the filesystem and gives it back on every exit path through
//! the RAII guard. With a cross-process adapter, a regular file at the primary path
//! (and at the destination of copy and rename) is also leased for the duration, so
//! another process's lease makes the operation fail with `LockTimeout`. Failures are
//! classified, then handed to the configured [`ErrorPolicy`].

mod copy;
mod rename;
mod times;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::classify::io_err;
use crate::errors::Result;
use crate::lock::{CrossProcessLocks, LeaseHold, PathLockTable};
use crate::platform::write_safer;
use crate::policy::ErrorPolicy;

/// Serialized access to files shared between callers.
#[derive(Clone)]
pub struct GuardedFs {
    table: Arc<PathLockTable>,
    cross: Option<Arc<CrossProcessLocks>>,
    policy: ErrorPolicy,
}

impl GuardedFs {
    /// In-process locking only, errors propagated.
    pub fn new(table: Arc<PathLockTable>) -> Self {
        Self { table, cross: None, policy: ErrorPolicy::Propagate }
    }

    /// Also take cross-process leases around every operation.
    pub fn with_cross_process(mut self, locks: Arc<CrossProcessLocks>) -> Self {
        self.cross = Some(locks);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn table(&self) -> &PathLockTable {
        &self.table
    }

    pub fn cross_process(&self) -> Option<&CrossProcessLocks> {
        self.cross.as_deref()
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Diagnostics only: held in this process, either in the table or as a lease.
    pub fn is_locked(&self, path: &Path) -> bool {
        self.table.is_locked(path) || self.cross.as_ref().is_some_and(|c| c.is_locked(path))
    }

    fn guarded<T>(
        &self,
        path: &Path,
        how: LeaseUse,
        f: impl FnOnce(Option<&LeaseHold>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.table.acquire(path);
        self.leased(path, how, f).map_err(|e| self.policy.enforce(e))
    }

    /// Run `f` under a counted lease hold on `path` when cross-process locking is on.
    /// The hold is given back afterwards; holds taken by anyone else are untouched.
    fn leased<T>(
        &self,
        path: &Path,
        how: LeaseUse,
        f: impl FnOnce(Option<&LeaseHold>) -> Result<T>,
    ) -> Result<T> {
        let Some(cross) = self.cross.as_deref() else {
            return f(None);
        };
        let Some(hold) = take_hold(cross, path, how)? else {
            return f(None);
        };
        let out = f(Some(&hold));
        let given_back = if how == LeaseUse::Consume && out.is_ok() {
            cross.forget(hold)
        } else {
            cross.unhold(hold)
        };
        if let Err(e) = given_back {
            if out.is_ok() {
                return Err(e);
            }
            warn!(path = %path.display(), error = %e, "failed to release lease after error");
        }
        out
    }

    /// Open an existing file read/write.
    pub fn open(&self, path: &Path) -> Result<File> {
        self.guarded(path, LeaseUse::Existing, |_| {
            OpenOptions::new().read(true).write(true).open(path).map_err(io_err("open", path))
        })
    }

    /// Flush `file` to disk and close it.
    pub fn close(&self, path: &Path, file: File) -> Result<()> {
        self.guarded(path, LeaseUse::Existing, |_| {
            file.sync_all().map_err(io_err("close", path))?;
            drop(file);
            trace!(path = %path.display(), "closed");
            Ok(())
        })
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.guarded(path, LeaseUse::Existing, |hold| match hold {
            Some(hold) => hold.read_all(),
            None => fs::read(path).map_err(io_err("read", path)),
        })
    }

    /// Replace the contents of `path` with `data`.
    pub fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.guarded(path, LeaseUse::Create, |hold| match hold {
            Some(hold) => hold.replace(data),
            None => {
                let mut reader: &[u8] = data;
                write_safer(path, &mut reader).map_err(io_err("write", path))?;
                Ok(())
            }
        })
    }

    /// Replace the contents of `path` with everything `reader` yields. Returns bytes written.
    pub fn write_from_reader(&self, path: &Path, reader: &mut dyn Read) -> Result<u64> {
        self.guarded(path, LeaseUse::Create, |hold| match hold {
            Some(hold) => {
                // The lease pins the inode, so no temp-and-rename here.
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(io_err("read input for", path))?;
                hold.replace(&buf)?;
                Ok(buf.len() as u64)
            }
            None => write_safer(path, reader).map_err(io_err("write", path)),
        })
    }

    /// Copy a file, or a directory tree merged into `dest`.
    pub fn copy(&self, src: &Path, dest: &Path) -> Result<u64> {
        self.guarded(src, LeaseUse::Existing, |_| {
            self.leased(dest, LeaseUse::Consume, |_| copy_any(src, dest, false))
        })
    }

    /// Like [`GuardedFs::copy`], also mirroring atime/mtime onto every copied file and directory.
    pub fn copy_preserving_times(&self, src: &Path, dest: &Path) -> Result<u64> {
        self.guarded(src, LeaseUse::Existing, |_| {
            self.leased(dest, LeaseUse::Consume, |_| copy_any(src, dest, true))
        })
    }

    /// Move `src` to `dest`. A directory moved onto an existing directory is merged into it.
    pub fn rename(&self, src: &Path, dest: &Path) -> Result<()> {
        self.guarded(src, LeaseUse::Consume, |_| {
            self.leased(dest, LeaseUse::Consume, |_| rename::move_path(src, dest))
        })
    }

    /// Remove a file or a whole tree. A path that does not exist is not an error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        self.guarded(path, LeaseUse::Consume, |_| {
            let meta = match fs::symlink_metadata(path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "remove: already absent");
                    return Ok(());
                }
                Err(e) => return Err(io_err("remove", path)(e)),
            };
            let res = if meta.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
            match res {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err("remove", path)(e)),
            }
        })
    }

    pub fn exists(&self, path: &Path) -> Result<bool> {
        self.guarded(path, LeaseUse::Existing, |_| path.try_exists().map_err(io_err("stat", path)))
    }
}

/// How an operation uses the lease on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseUse {
    /// Only an existing file is leased; a missing one is left to the operation.
    Existing,
    /// The lease file is created when missing.
    Create,
    /// The file at this path is gone or replaced once the operation succeeds.
    Consume,
}

/// Only regular files carry leases. Directories, and symlinks that are themselves
/// removed or renamed, are left alone.
fn take_hold(cross: &CrossProcessLocks, path: &Path, how: LeaseUse) -> Result<Option<LeaseHold>> {
    let meta = if how == LeaseUse::Consume { fs::symlink_metadata(path) } else { fs::metadata(path) };
    match meta {
        Ok(m) if !m.is_file() => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound && how != LeaseUse::Create => return Ok(None),
        _ => {}
    }
    match cross.hold(path, how == LeaseUse::Create) {
        Ok(hold) => Ok(Some(hold)),
        Err(e)
            if how != LeaseUse::Create
                && e.io_error().is_some_and(|io| io.kind() == io::ErrorKind::NotFound) =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn copy_any(src: &Path, dest: &Path, preserve_times: bool) -> Result<u64> {
    let meta = fs::metadata(src).map_err(io_err("copy", src))?;
    if meta.is_dir() {
        copy::copy_tree(src, dest, preserve_times)
    } else {
        copy::copy_file(src, dest, preserve_times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LeaseSettings;
    use filetime::FileTime;
    use std::io::Write;
    use tempfile::tempdir;

    fn gfs() -> GuardedFs {
        GuardedFs::new(Arc::new(PathLockTable::new()))
    }

    #[test]
    fn write_read_and_table_drains() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("doc.sy");
        let fs_ = gfs();
        fs_.write_file(&p, b"hello").unwrap();
        assert_eq!(fs_.read_file(&p).unwrap(), b"hello");
        assert!(fs_.exists(&p).unwrap());
        assert!(fs_.table().is_empty());
    }

    #[test]
    fn lock_released_on_error_path() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("missing.sy");
        let fs_ = gfs();
        let err = fs_.read_file(&p).unwrap_err();
        assert_eq!(err.io_error().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
        assert!(!fs_.is_locked(&p));
        fs_.write_file(&p, b"now").unwrap();
    }

    #[test]
    fn open_then_close() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("o.txt");
        let fs_ = gfs();
        assert!(fs_.open(&p).is_err(), "open does not create");
        fs::write(&p, b"").unwrap();
        let mut f = fs_.open(&p).unwrap();
        f.write_all(b"abc").unwrap();
        fs_.close(&p, f).unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"abc");
    }

    #[test]
    fn write_from_reader_counts_bytes() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("stream.bin");
        let mut src: &[u8] = &[7u8; 4096];
        assert_eq!(gfs().write_from_reader(&p, &mut src).unwrap(), 4096);
        assert_eq!(fs::metadata(&p).unwrap().len(), 4096);
    }

    #[test]
    fn remove_is_remove_all() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("t");
        fs::create_dir_all(tree.join("x/y")).unwrap();
        fs::write(tree.join("x/y/z.txt"), b"z").unwrap();
        let fs_ = gfs();
        fs_.remove(&tree).unwrap();
        assert!(!tree.exists());
        fs_.remove(&tree).unwrap();
    }

    #[test]
    fn copy_preserving_times_on_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/f.txt"), b"f").unwrap();
        let old = FileTime::from_unix_time(1_400_000_000, 0);
        filetime::set_file_times(src.join("sub/f.txt"), old, old).unwrap();
        filetime::set_file_times(src.join("sub"), old, old).unwrap();

        let dst = dir.path().join("dst");
        gfs().copy_preserving_times(&src, &dst).unwrap();
        for rel in ["sub/f.txt", "sub"] {
            let m = fs::metadata(dst.join(rel)).unwrap();
            assert_eq!(FileTime::from_last_modification_time(&m), old, "{rel}");
        }
    }

    #[test]
    fn cross_process_read_write_release_lease() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("shared.json");
        let cross = Arc::new(CrossProcessLocks::new(LeaseSettings::default()).unwrap());
        let fs_ = gfs().with_cross_process(Arc::clone(&cross));

        assert!(fs_.read_file(&p).is_err());
        assert!(!p.exists(), "failed read must not create the file");

        fs_.write_file(&p, b"{}").unwrap();
        assert!(cross.is_empty());
        assert_eq!(fs_.read_file(&p).unwrap(), b"{}");
        assert!(cross.is_empty());

        cross.acquire(&p).unwrap();
        fs_.write_file(&p, b"[]").unwrap();
        assert!(cross.is_locked(&p), "caller's own lease survives the write");
        fs_.remove(&p).unwrap();
        assert!(cross.is_empty(), "lease on a removed file is dropped");
    }

    #[test]
    fn directories_are_not_leased() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("tree");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/f.txt"), b"f").unwrap();
        let cross = Arc::new(CrossProcessLocks::new(LeaseSettings::default()).unwrap());
        let fs_ = gfs().with_cross_process(Arc::clone(&cross));

        fs_.copy(&src, &dir.path().join("copy")).unwrap();
        fs_.rename(&src, &dir.path().join("moved")).unwrap();
        assert!(fs_.exists(&dir.path().join("moved/sub/f.txt")).unwrap());
        assert!(!fs_.exists(&src).unwrap());
        assert!(cross.is_empty());
    }
}

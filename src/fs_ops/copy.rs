//! File and tree copies.
//! - Files are copied to a hidden temp sibling of the destination, then renamed over it
//! - Trees: directories are created first, files copied in parallel (rayon)
//! - Directory times are mirrored last, deepest first, since copying into a directory bumps its mtime

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use super::times::mirror_times;
use crate::classify::{io_err, wrap_io};
use crate::errors::{FileGateError, Result};
use crate::platform::{fsync_dir, tmp_sibling_name};

/// Copy one regular file onto `dest`, replacing it atomically if it exists.
pub(super) fn copy_file(src: &Path, dest: &Path, preserve_times: bool) -> Result<u64> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err("create destination directory", parent))?;
    }
    let tmp = tmp_sibling_name(dest);
    let bytes = match fs::copy(src, &tmp) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(wrap_io("copy", src, e));
        }
    };
    if preserve_times {
        let meta = fs::metadata(src).map_err(io_err("stat", src))?;
        mirror_times(&tmp, &meta);
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(wrap_io("rename temporary file into place", dest, e));
    }
    if let Some(parent) = dest.parent() {
        let _ = fsync_dir(parent);
    }
    Ok(bytes)
}

/// Copy the tree rooted at `src` into `dest`, merging with whatever `dest` holds.
/// Entries from `src` override same-named files in `dest`.
pub(super) fn copy_tree(src: &Path, dest: &Path, preserve_times: bool) -> Result<u64> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut files: Vec<PathBuf> = Vec::new();
    let mut links: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|source| FileGateError::Walk { root: src.to_path_buf(), source })?;
        let ft = entry.file_type();
        if ft.is_dir() {
            dirs.push(entry.into_path());
        } else if ft.is_file() {
            files.push(entry.into_path());
        } else if ft.is_symlink() {
            links.push(entry.into_path());
        }
    }

    for dir in &dirs {
        let target = rebase(src, dest, dir);
        fs::create_dir_all(&target).map_err(io_err("create directory", &target))?;
    }

    let bytes = files
        .par_iter()
        .map(|path| copy_file(path, &rebase(src, dest, path), preserve_times))
        .try_reduce(|| 0u64, |a, b| Ok(a + b))?;

    for link in &links {
        copy_link(link, &rebase(src, dest, link))?;
    }

    if preserve_times {
        for dir in dirs.iter().rev() {
            let meta = fs::metadata(dir).map_err(io_err("stat", dir))?;
            mirror_times(&rebase(src, dest, dir), &meta);
        }
    }

    info!(
        src = %src.display(),
        dest = %dest.display(),
        dirs = dirs.len(),
        files = files.len(),
        bytes,
        "copied directory tree"
    );
    Ok(bytes)
}

/// Map `path` (somewhere under `src`) to the same relative spot under `dest`.
fn rebase(src: &Path, dest: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(src) {
        Ok(rel) if rel.as_os_str().is_empty() => dest.to_path_buf(),
        Ok(rel) => dest.join(rel),
        Err(_) => dest.to_path_buf(),
    }
}

#[cfg(unix)]
fn copy_link(link: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(link).map_err(io_err("read link", link))?;
    if fs::symlink_metadata(dest).is_ok() {
        fs::remove_file(dest).map_err(io_err("replace link", dest))?;
    }
    std::os::unix::fs::symlink(&target, dest).map_err(io_err("create link", dest))
}

#[cfg(not(unix))]
fn copy_link(link: &Path, _dest: &Path) -> Result<()> {
    tracing::debug!(path = %link.display(), "skipping symlink in tree copy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_copy_replaces_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("out").join("a.txt");
        fs::write(&src, b"new").unwrap();
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, b"older and longer").unwrap();

        assert_eq!(copy_file(&src, &dst, false).unwrap(), 3);
        assert_eq!(fs::read(&dst).unwrap(), b"new");
        let leftovers: Vec<_> = fs::read_dir(dst.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn tree_copy_merges() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("nested/deep")).unwrap();
        fs::write(src.join("top.txt"), b"src-top").unwrap();
        fs::write(src.join("nested/deep/leaf.txt"), b"leaf").unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("top.txt"), b"dst-top").unwrap();
        fs::write(dst.join("only-dst.txt"), b"keep").unwrap();

        copy_tree(&src, &dst, false).unwrap();
        assert_eq!(fs::read(dst.join("top.txt")).unwrap(), b"src-top");
        assert_eq!(fs::read(dst.join("nested/deep/leaf.txt")).unwrap(), b"leaf");
        assert_eq!(fs::read(dst.join("only-dst.txt")).unwrap(), b"keep");
        assert!(src.join("top.txt").exists(), "copy leaves the source alone");
    }
}

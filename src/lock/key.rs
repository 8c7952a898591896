//! Lock keys.
//!
//! Two spellings of the same file must map to one key, otherwise two callers
//! could hold "different" locks on the same inode. Keys are absolute and, where
//! the filesystem allows, symlink-resolved:
//! - existing path: canonicalized
//! - missing path with an existing parent: canonical parent + file name
//! - otherwise: made absolute lexically

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(PathBuf);

impl LockKey {
    pub fn new(path: &Path) -> Self {
        if let Ok(p) = dunce::canonicalize(path) {
            return LockKey(p);
        }
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name())
            && let Ok(parent) = dunce::canonicalize(parent)
        {
            return LockKey(parent.join(name));
        }
        LockKey(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dot_segments_collapse_to_one_key() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let direct = LockKey::new(&dir.path().join("a.txt"));
        let dotted = LockKey::new(&dir.path().join("sub").join("..").join("a.txt"));
        assert_eq!(direct, dotted);
    }

    #[test]
    fn missing_file_keys_on_canonical_parent() {
        let dir = tempdir().unwrap();
        let key = LockKey::new(&dir.path().join("later.json"));
        let parent = dunce::canonicalize(dir.path()).unwrap();
        assert_eq!(key.as_path(), parent.join("later.json"));
    }

    #[test]
    fn relative_missing_path_becomes_absolute() {
        let key = LockKey::new(Path::new("no/such/dir/file.bin"));
        assert!(key.as_path().is_absolute());
    }
}

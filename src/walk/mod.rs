//! Directory enumeration.
//!
//! The native walk uses walkdir, visiting the root first and siblings in file-name
//! order. The loopback strategy asks a local helper process for a flat listing and
//! replays it through the same callback; if the helper cannot be reached or answers
//! with an error, the walk silently falls back to the native strategy.
//!
//! The walk never touches the path lock table.

mod loopback;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{FileGateError, Result};

pub use loopback::{DEFAULT_WALK_HOST, DEFAULT_WALK_PORT, DEFAULT_WALK_TIMEOUT};

/// One visited entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
    mode: u32,
}

impl FileEntry {
    /// Permission bits. Entries from the loopback helper carry 0755/0644.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    fn from_walkdir(entry: &walkdir::DirEntry) -> std::result::Result<Self, walkdir::Error> {
        let meta = entry.metadata()?;
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o777
        };
        #[cfg(not(unix))]
        let mode = if meta.is_dir() { 0o755 } else { 0o644 };
        Ok(FileEntry {
            path: entry.path().to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
            mode,
        })
    }
}

/// What the callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// On a directory: do not descend. On a file: skip the rest of its directory
    /// (native) or entries under its path (loopback).
    SkipSubtree,
    /// End the walk successfully.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStrategy {
    Native,
    Loopback { host: String, port: u16, timeout: Duration },
}

impl WalkStrategy {
    pub fn loopback_default() -> Self {
        WalkStrategy::Loopback {
            host: DEFAULT_WALK_HOST.to_string(),
            port: DEFAULT_WALK_PORT,
            timeout: DEFAULT_WALK_TIMEOUT,
        }
    }

    /// Loopback on Android, native elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "android") { Self::loopback_default() } else { WalkStrategy::Native }
    }
}

/// Which strategy actually produced the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkSource {
    Native,
    Loopback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOutcome {
    pub visited: usize,
    pub source: WalkSource,
}

#[derive(Debug, Clone)]
pub struct Walker {
    strategy: WalkStrategy,
    max_depth: Option<usize>,
}

impl Walker {
    pub fn new(strategy: WalkStrategy) -> Self {
        Self { strategy, max_depth: None }
    }

    pub fn native() -> Self {
        Self::new(WalkStrategy::Native)
    }

    /// Depth 0 is the root itself.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn strategy(&self) -> &WalkStrategy {
        &self.strategy
    }

    /// Visit `root` and everything below it.
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> Result<WalkOutcome>
    where
        F: FnMut(&FileEntry) -> anyhow::Result<WalkControl>,
    {
        if let WalkStrategy::Loopback { host, port, timeout } = &self.strategy {
            match loopback::fetch_listing(host, *port, *timeout, root) {
                Ok(listing) => {
                    debug!(root = %root.display(), entries = listing.len(), "walking helper listing");
                    let visited = self.replay(root, listing, &mut visit)?;
                    return Ok(WalkOutcome { visited, source: WalkSource::Loopback });
                }
                Err(e) => {
                    warn!(root = %root.display(), error = %format!("{e:#}"), "walk helper unavailable; walking natively");
                }
            }
        }
        let visited = self.walk_native(root, &mut visit)?;
        Ok(WalkOutcome { visited, source: WalkSource::Native })
    }

    fn walk_native<F>(&self, root: &Path, visit: &mut F) -> Result<usize>
    where
        F: FnMut(&FileEntry) -> anyhow::Result<WalkControl>,
    {
        let mut walker = WalkDir::new(root).sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }
        let mut it = walker.into_iter();
        let mut visited = 0;
        while let Some(next) = it.next() {
            let walk_err = |source| FileGateError::Walk { root: root.to_path_buf(), source };
            let dent = next.map_err(walk_err)?;
            let entry = FileEntry::from_walkdir(&dent).map_err(walk_err)?;
            visited += 1;
            match visit(&entry).map_err(FileGateError::Callback)? {
                WalkControl::Continue => {}
                WalkControl::SkipSubtree => it.skip_current_dir(),
                WalkControl::Stop => break,
            }
        }
        Ok(visited)
    }

    /// Flat listings cannot be pruned while enumerating, so skipped subtrees are
    /// remembered and every later entry under one of them is dropped.
    fn replay<F>(&self, root: &Path, listing: Vec<FileEntry>, visit: &mut F) -> Result<usize>
    where
        F: FnMut(&FileEntry) -> anyhow::Result<WalkControl>,
    {
        let mut skipped: Vec<PathBuf> = Vec::new();
        let mut visited = 0;
        for entry in listing {
            if skipped.iter().any(|s| entry.path.starts_with(s)) {
                continue;
            }
            if let Some(max) = self.max_depth
                && let Ok(rel) = entry.path.strip_prefix(root)
                && rel.components().count() > max
            {
                continue;
            }
            visited += 1;
            match visit(&entry).map_err(FileGateError::Callback)? {
                WalkControl::Continue => {}
                WalkControl::SkipSubtree => skipped.push(entry.path),
                WalkControl::Stop => break,
            }
        }
        Ok(visited)
    }
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(WalkStrategy::platform_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let r = dir.path();
        fs::create_dir_all(r.join("a/deep")).unwrap();
        fs::create_dir_all(r.join("b")).unwrap();
        fs::write(r.join("a/one.txt"), b"1").unwrap();
        fs::write(r.join("a/deep/two.txt"), b"22").unwrap();
        fs::write(r.join("b/three.txt"), b"333").unwrap();
        fs::write(r.join("top.txt"), b"t").unwrap();
        dir
    }

    fn names(walker: &Walker, root: &Path, skip: Option<&str>) -> Vec<String> {
        let mut seen = Vec::new();
        walker
            .walk(root, |e| {
                let rel = e.path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                seen.push(rel.clone());
                Ok(if Some(rel.as_str()) == skip { WalkControl::SkipSubtree } else { WalkControl::Continue })
            })
            .unwrap();
        seen
    }

    #[test]
    fn native_walk_is_sorted_and_includes_root() {
        let dir = fixture();
        let got = names(&Walker::native(), dir.path(), None);
        assert_eq!(
            got,
            ["", "a", "a/deep", "a/deep/two.txt", "a/one.txt", "b", "b/three.txt", "top.txt"]
        );
    }

    #[test]
    fn native_skip_subtree_prunes_directory() {
        let dir = fixture();
        let got = names(&Walker::native(), dir.path(), Some("a"));
        assert_eq!(got, ["", "a", "b", "b/three.txt", "top.txt"]);
    }

    #[test]
    fn stop_ends_walk_without_error() {
        let dir = fixture();
        let mut n = 0;
        let out = Walker::native()
            .walk(dir.path(), |_| {
                n += 1;
                Ok(if n == 3 { WalkControl::Stop } else { WalkControl::Continue })
            })
            .unwrap();
        assert_eq!(out.visited, 3);
    }

    #[test]
    fn callback_error_surfaces() {
        let dir = fixture();
        let err = Walker::native()
            .walk(dir.path(), |_| Err(anyhow::anyhow!("nope")))
            .unwrap_err();
        assert!(matches!(err, FileGateError::Callback(_)));
    }

    #[test]
    fn max_depth_limits_native() {
        let dir = fixture();
        let got = names(&Walker::native().with_max_depth(1), dir.path(), None);
        assert_eq!(got, ["", "a", "b", "top.txt"]);
    }

    #[test]
    fn replay_drops_entries_under_skipped_prefix() {
        let root = Path::new("/r");
        let entry = |p: &str, is_dir: bool| FileEntry {
            path: PathBuf::from(p),
            name: Path::new(p).file_name().unwrap().to_string_lossy().into_owned(),
            size: 0,
            modified: None,
            is_dir,
            mode: 0o644,
        };
        let listing = vec![
            entry("/r/a", true),
            entry("/r/a/x.txt", false),
            entry("/r/ab.txt", false),
            entry("/r/b", true),
        ];
        let mut seen = Vec::new();
        let walker = Walker::native();
        walker
            .replay(root, listing, &mut |e: &FileEntry| -> anyhow::Result<WalkControl> {
                seen.push(e.path.clone());
                Ok(if e.path == Path::new("/r/a") { WalkControl::SkipSubtree } else { WalkControl::Continue })
            })
            .unwrap();
        // "/r/ab.txt" shares a string prefix with "/r/a" but not a path prefix.
        assert_eq!(seen, [PathBuf::from("/r/a"), PathBuf::from("/r/ab.txt"), PathBuf::from("/r/b")]);
    }

    #[test]
    fn unreachable_helper_falls_back() {
        let dir = fixture();
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let walker = Walker::new(WalkStrategy::Loopback {
            host: "127.0.0.1".into(),
            port,
            timeout: Duration::from_secs(2),
        });
        let out = walker.walk(dir.path(), |_| Ok(WalkControl::Continue)).unwrap();
        assert_eq!(out.source, WalkSource::Native);
        assert_eq!(out.visited, 8);
    }
}

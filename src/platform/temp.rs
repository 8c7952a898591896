//! Unique sibling filenames for write-then-rename operations.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden sibling of `target` in the same directory, so the final rename never
/// crosses a filesystem boundary.
/// Pattern: .filegate.<pid>.<nanos>.<seq>.tmp
pub(crate) fn tmp_sibling_name(target: &Path) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!(".filegate.{pid}.{nanos}.{seq}.tmp");
    target.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn uniqueness_concurrent() {
        let target = Path::new("/data/notes.sy");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let t = target.to_path_buf();
            handles.push(thread::spawn(move || tmp_sibling_name(&t)));
        }
        let mut set = HashSet::new();
        for h in handles {
            let p = h.join().unwrap();
            assert_eq!(p.parent(), Some(Path::new("/data")));
            assert!(set.insert(p));
        }
        assert_eq!(set.len(), 32);
    }
}

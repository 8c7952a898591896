use std::fs;
use std::sync::Arc;

use assert_fs::prelude::*;
use filegate::{GuardedFs, PathLockTable};

fn files() -> GuardedFs {
    GuardedFs::new(Arc::new(PathLockTable::new()))
}

#[test]
fn directory_onto_existing_directory_merges() {
    let temp = assert_fs::TempDir::new().unwrap();
    let a = temp.child("A");
    let b = temp.child("B");
    a.child("shared.txt").write_str("from A").unwrap();
    a.child("only_a/inner.txt").write_str("a-inner").unwrap();
    b.child("shared.txt").write_str("from B").unwrap();
    b.child("only_b.txt").write_str("b").unwrap();

    files().rename(a.path(), b.path()).unwrap();

    assert!(!a.path().exists(), "source removed after merge");
    b.child("shared.txt").assert("from A");
    b.child("only_a/inner.txt").assert("a-inner");
    b.child("only_b.txt").assert("b");
}

#[test]
fn directory_onto_missing_destination_is_plain_move() {
    let temp = assert_fs::TempDir::new().unwrap();
    let a = temp.child("A");
    a.child("x/y.txt").write_str("y").unwrap();
    let b = temp.child("B");

    #[cfg(unix)]
    let ino_before = {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(a.path()).unwrap().ino()
    };

    files().rename(a.path(), b.path()).unwrap();

    assert!(!a.path().exists());
    b.child("x/y.txt").assert("y");
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        assert_eq!(fs::metadata(b.path()).unwrap().ino(), ino_before, "rename, not copy");
    }
}

#[test]
fn file_rename_replaces_existing_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let src = temp.child("new.json");
    let dst = temp.child("cur.json");
    src.write_str("{\"v\":2}").unwrap();
    dst.write_str("{\"v\":1}").unwrap();

    let fs_ = files();
    fs_.rename(src.path(), dst.path()).unwrap();
    dst.assert("{\"v\":2}");
    assert!(!fs_.exists(src.path()).unwrap());
    assert!(fs_.table().is_empty());
}

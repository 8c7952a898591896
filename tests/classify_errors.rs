use std::io;
use std::path::Path;

use filegate::{ErrorClass, classify, is_busy, wrap_io};

#[test]
fn permission_denied_and_in_use_text_are_contention() {
    let denied = io::Error::from(io::ErrorKind::PermissionDenied);
    let in_use = io::Error::other("file is Used By Another Process");
    assert!(is_busy(&denied));
    assert!(is_busy(&in_use));
    assert_eq!(classify(Some(&in_use)), ErrorClass::Busy);
}

#[test]
fn unrelated_errors_pass_through() {
    let e = io::Error::other("open /x: no such file or directory");
    assert_eq!(classify(Some(&e)), ErrorClass::Other);
    let wrapped = wrap_io("read", Path::new("/x"), e);
    assert!(!wrapped.is_unable_access());
}

#[cfg(unix)]
#[test]
fn real_denied_write_is_wrapped_as_sentinel() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    // root bypasses mode bits
    if unsafe { libc::geteuid() } == 0 {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let locked = dir.path().join("ro");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    let files = filegate::GuardedFs::new(Arc::new(filegate::PathLockTable::new()));
    let err = files.write_file(&locked.join("new.txt"), b"x").unwrap_err();
    assert!(err.is_unable_access(), "got {err}");
    assert!(files.table().is_empty(), "lock released on the error path");

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

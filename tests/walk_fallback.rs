use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use filegate::{WalkControl, WalkSource, WalkStrategy, Walker};
use tempfile::tempdir;

fn fixture(root: &Path) {
    fs::create_dir_all(root.join("docs/drafts")).unwrap();
    fs::create_dir_all(root.join("media")).unwrap();
    fs::write(root.join("docs/a.sy"), b"a").unwrap();
    fs::write(root.join("docs/drafts/b.sy"), b"bb").unwrap();
    fs::write(root.join("media/c.png"), b"ccc").unwrap();
    fs::write(root.join("readme.md"), b"r").unwrap();
}

/// Paths visited when the callback skips `docs/drafts`.
fn visit(walker: &Walker, root: &Path) -> (Vec<PathBuf>, WalkSource) {
    let skip = root.join("docs/drafts");
    let mut seen = Vec::new();
    let outcome = walker
        .walk(root, |e| {
            seen.push(e.path.clone());
            Ok(if e.path == skip { WalkControl::SkipSubtree } else { WalkControl::Continue })
        })
        .unwrap();
    (seen, outcome.source)
}

fn unused_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

/// One-shot HTTP server answering a single request with `status` and `body`.
/// Returns the port and a handle yielding the request body it received.
fn serve_once(status: &'static str, body: String) -> (u16, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':')
                && k.eq_ignore_ascii_case("content-length")
            {
                content_length = v.trim().parse().unwrap();
            }
        }
        let mut req = vec![0u8; content_length];
        reader.read_exact(&mut req).unwrap();
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        String::from_utf8(req).unwrap()
    });
    (port, handle)
}

fn loopback(port: u16) -> Walker {
    Walker::new(WalkStrategy::Loopback {
        host: "127.0.0.1".into(),
        port,
        timeout: Duration::from_secs(5),
    })
}

#[test]
fn unreachable_helper_yields_native_entries() {
    let dir = tempdir().unwrap();
    fixture(dir.path());

    let (native, native_src) = visit(&Walker::native(), dir.path());
    let (fallback, fallback_src) = visit(&loopback(unused_port()), dir.path());

    assert_eq!(native_src, WalkSource::Native);
    assert_eq!(fallback_src, WalkSource::Native);
    assert_eq!(native, fallback);
    assert!(native.contains(&dir.path().join("docs/drafts")));
    assert!(!native.contains(&dir.path().join("docs/drafts/b.sy")));
    assert!(native.contains(&dir.path().join("media/c.png")));
}

#[test]
fn helper_listing_is_replayed_with_skips() {
    let root = "/storage/emulated/0/data";
    let body = serde_json::json!({
        "code": 0,
        "msg": "",
        "data": {"files": [
            {"path": format!("{root}/notes"), "name": "notes", "size": 0, "updated": 1_700_000_000_000i64, "isDir": true},
            {"path": format!("{root}/notes/a.sy"), "name": "a.sy", "size": 12, "updated": 1_700_000_000_500i64, "isDir": false},
            {"path": format!("{root}/notes-archive.sy"), "name": "notes-archive.sy", "size": 3, "updated": 0, "isDir": false},
            {"path": format!("{root}/z.sy"), "name": "z.sy", "size": 1, "updated": 0, "isDir": false}
        ]}
    });
    let (port, server) = serve_once("200 OK", body.to_string());

    let mut seen = Vec::new();
    let outcome = loopback(port)
        .walk(Path::new(root), |e| {
            seen.push((e.name.clone(), e.mode()));
            Ok(if e.name == "notes" { WalkControl::SkipSubtree } else { WalkControl::Continue })
        })
        .unwrap();

    assert_eq!(outcome.source, WalkSource::Loopback);
    assert_eq!(
        seen,
        [
            ("notes".to_string(), 0o755),
            ("notes-archive.sy".to_string(), 0o644),
            ("z.sy".to_string(), 0o644)
        ]
    );
    let request: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    assert_eq!(request["dir"], root);
}

#[test]
fn helper_error_code_falls_back_to_native() {
    let dir = tempdir().unwrap();
    fixture(dir.path());
    let body = serde_json::json!({"code": -1, "msg": "walk failed"}).to_string();
    let (port, server) = serve_once("200 OK", body);

    let (entries, source) = visit(&loopback(port), dir.path());
    server.join().unwrap();
    assert_eq!(source, WalkSource::Native);
    assert_eq!(entries, visit(&Walker::native(), dir.path()).0);
}

#[test]
fn helper_http_error_falls_back_to_native() {
    let dir = tempdir().unwrap();
    fixture(dir.path());
    let (port, server) = serve_once("500 Internal Server Error", "{}".to_string());

    let (_, source) = visit(&loopback(port), dir.path());
    server.join().unwrap();
    assert_eq!(source, WalkSource::Native);
}

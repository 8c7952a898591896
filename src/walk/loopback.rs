//! Client for the loopback walk helper.
//!
//! `POST http://<host>:<port>/api/walkDir` with `{"dir": <root>}`; the helper answers
//! `{"code": 0, "data": {"files": [{path, name, size, updated, isDir}, ...]}}` with
//! `updated` in Unix milliseconds. Any non-200 status or non-zero code is an error here;
//! the caller decides to fall back.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::info;

use super::FileEntry;

pub const DEFAULT_WALK_PORT: u16 = 6906;
pub const DEFAULT_WALK_HOST: &str = "[::1]";
pub const DEFAULT_WALK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct WalkRequest<'a> {
    dir: &'a str,
}

#[derive(Deserialize)]
struct WalkResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<WalkData>,
}

#[derive(Deserialize)]
struct WalkData {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    path: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    updated: i64,
    is_dir: bool,
}

impl From<RemoteFile> for FileEntry {
    fn from(f: RemoteFile) -> Self {
        let modified = if f.updated >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_millis(f.updated as u64))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_millis(f.updated.unsigned_abs()))
        };
        FileEntry {
            path: PathBuf::from(f.path),
            name: f.name,
            size: f.size,
            modified,
            is_dir: f.is_dir,
            mode: if f.is_dir { 0o755 } else { 0o644 },
        }
    }
}

/// Ask the helper for a flattened listing of `root`.
pub(super) fn fetch_listing(
    host: &str,
    port: u16,
    timeout: Duration,
    root: &Path,
) -> Result<Vec<FileEntry>> {
    let url = format!("http://{host}:{port}/api/walkDir");
    let dir = root.to_string_lossy();
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("build walk helper client")?;

    let start = Instant::now();
    let response = client.post(&url).json(&WalkRequest { dir: &dir }).send();
    info!(
        root = %root.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "walk helper request finished"
    );
    let response = response.with_context(|| format!("POST {url}"))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        bail!("walk helper returned HTTP {status}");
    }
    let body: WalkResponse = response.json().context("decode walk helper response")?;
    if body.code != 0 {
        bail!(
            "walk helper returned code {}: {}",
            body.code,
            body.msg.as_deref().unwrap_or("no message")
        );
    }
    let files = body.data.map(|d| d.files).unwrap_or_default();
    Ok(files.into_iter().map(FileEntry::from).collect())
}

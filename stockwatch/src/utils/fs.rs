//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and the
//! write-to-temp-then-rename discipline every persisted document relies on.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    ensure_dir_all_with_op("creating directory", parent).await
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Prefix for temp files next to `path`: `state.json` -> `.state.json.`.
fn temp_prefix(path: &Path) -> OsString {
    let mut prefix = OsString::from(".");
    prefix.push(path.file_name().unwrap_or_else(|| OsStr::new("state")));
    prefix.push(".");
    prefix
}

/// Replace `path` with `contents` atomically.
///
/// Every write gets its own uniquely named temp file in the target's
/// directory, flushed to disk and then renamed over the target. Concurrent
/// writers (including other processes) never share a temp file, so readers
/// see one complete version or another.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;

    let target = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || persist_atomic(&target, &contents))
        .await
        .map_err(|e| io_error("writing", path, std::io::Error::other(e)))?
}

fn persist_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| io_error("creating temp file in", dir, e))?;
    temp.write_all(contents)
        .map_err(|e| io_error("writing temp file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing temp file", temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| io_error("renaming temp file onto", path, e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

/// Read a JSON document, returning `None` when it is missing or unreadable.
///
/// Corruption is logged and treated like absence; callers fall back to an
/// empty document.
pub async fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read state file, treating as empty");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt state file, treating as empty");
            None
        }
    }
}

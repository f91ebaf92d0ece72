use log::debug;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub(crate) enum FileError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("input file is empty: {0}")]
    Empty(PathBuf),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Reads a message file, trimmed. Blank files are rejected.
pub(crate) async fn read_message(path: &Path) -> Result<String, FileError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| FileError::Read {
            path: path.to_owned(),
            source,
        })?;

    let text = text.trim();
    if text.is_empty() {
        return Err(FileError::Empty(path.to_owned()));
    }

    debug!("Read {} bytes from {}", text.len(), path.display());
    Ok(text.to_owned())
}

/// `<dir>/<control_id>.<kind>.json`. Characters outside `[A-Za-z0-9._-]` become `_`,
/// so the control id always names a single file inside `dir`.
pub(crate) fn artifact_path(dir: &Path, control_id: &str, kind: &str) -> PathBuf {
    let stem: String = control_id
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    dir.join(format!("{stem}.{kind}.json"))
}

/// Pretty-printed JSON, parent directories created as needed.
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| FileError::Serialize {
        path: path.to_owned(),
        source,
    })?;

    let write_err = |source: io::Error| FileError::Write {
        path: path.to_owned(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    fs::write(path, json).await.map_err(write_err)
}

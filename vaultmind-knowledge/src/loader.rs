//! Reading a vault directory into notes.
//!
//! This is the only module that touches the filesystem. A note that cannot
//! be read or parsed is reported in [`VaultLoad::failures`] and the load
//! carries on.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::EngineSettings;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::Note;
use crate::parser::parse_note;
use crate::paths::relative_key;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct VaultLoad {
    /// Parsed notes in path order.
    pub notes: Vec<Note>,
    pub failures: Vec<ParseFailure>,
}

fn is_skipped_dir(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || ignore_dirs.iter().any(|ignored| *ignored == name)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Load and parse every markdown file below `root`.
pub async fn load_vault(root: &Path, settings: &EngineSettings) -> KnowledgeResult<VaultLoad> {
    if !tokio::fs::metadata(root).await.is_ok_and(|meta| meta.is_dir()) {
        return Err(KnowledgeError::MissingVaultRoot(root.to_path_buf()));
    }

    let mut load = VaultLoad::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry, &settings.ignore_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                warn!(path = %path, error = %err, "skipping unreadable vault entry");
                load.failures.push(ParseFailure {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }

        let key = relative_key(root, entry.path())?;
        match read_note(entry.path(), &key).await {
            Ok(note) => load.notes.push(note),
            Err(err) => {
                warn!(path = %key, error = %err, "failed to load note");
                load.failures.push(ParseFailure {
                    path: key,
                    message: err.to_string(),
                });
            }
        }
    }

    load.notes.sort_by(|a, b| a.path.cmp(&b.path));
    info!(
        root = %root.display(),
        notes = load.notes.len(),
        failures = load.failures.len(),
        "vault loaded"
    );
    Ok(load)
}

async fn read_note(path: &Path, key: &str) -> KnowledgeResult<Note> {
    let raw = tokio::fs::read_to_string(path).await?;
    let modified = tokio::fs::metadata(path)
        .await?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    parse_note(&raw, key, modified)
}

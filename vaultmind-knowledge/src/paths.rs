//! Helpers for vault-relative path keys.
//!
//! Keys are opaque strings with `/` separators. Nothing here touches the
//! filesystem except [`relative_key`], which the loader uses to turn a walked
//! entry into a key.

use std::path::Path;

use crate::errors::{KnowledgeError, KnowledgeResult};

/// Vault-relative key for a file below `root`.
pub fn relative_key(root: &Path, path: &Path) -> KnowledgeResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| KnowledgeError::PathOutsideRoot(path.to_path_buf()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}

/// Last path segment.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Last path segment without a trailing `.md`.
pub fn file_stem(key: &str) -> &str {
    let name = file_name(key);
    match name.len().checked_sub(3) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".md") => {
            &name[..cut]
        }
        _ => name,
    }
}

/// Directory part of a key, empty for notes at the vault root.
pub fn folder_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
}

/// Whether `key` lives in `folder` or one of its subfolders.
///
/// Matching is case-insensitive; an empty folder (or `/`) matches everything.
pub fn in_folder(key: &str, folder: &str) -> bool {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        return true;
    }
    let key = key.to_lowercase();
    let folder = folder.to_lowercase();
    key.strip_prefix(&folder)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Lowercased key without the `.md` suffix, used for path-style link targets.
pub fn link_key(key: &str) -> String {
    let lower = key.trim().trim_start_matches('/').to_lowercase();
    match lower.strip_suffix(".md") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

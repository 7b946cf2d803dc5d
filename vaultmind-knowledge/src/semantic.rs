//! Dense-vector ranking and reciprocal rank fusion.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::VaultIndex;

/// Cosine similarity in `[-1, 1]`.
///
/// Zero when either vector is all zeros, when the lengths differ, or when
/// the result would not be finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

/// A note vector, valid only while `content_hash` matches the note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub path: String,
    pub content_hash: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub path: String,
    pub title: String,
    pub score: f32,
    /// 1-based.
    pub rank: usize,
}

/// Whether `record` can be compared against the current snapshot.
pub fn is_current(index: &VaultIndex, record: &EmbeddingRecord) -> bool {
    index
        .note(&record.path)
        .is_some_and(|note| note.content_hash == record.content_hash)
}

/// Rank records by similarity to `query`, best first.
///
/// Records for missing notes, with a stale hash, or with a different
/// dimension than the query are left out.
pub fn semantic_rank<'a>(
    index: &VaultIndex,
    records: impl IntoIterator<Item = &'a EmbeddingRecord>,
    query: &[f32],
    limit: usize,
) -> Vec<SemanticHit> {
    let mut skipped = 0usize;
    let mut scored: Vec<(String, String, f32)> = Vec::new();

    for record in records {
        let Some(note) = index.note(&record.path) else {
            skipped += 1;
            continue;
        };
        if note.content_hash != record.content_hash || record.vector.len() != query.len() {
            skipped += 1;
            continue;
        }
        scored.push((
            note.path.clone(),
            note.title.clone(),
            cosine_similarity(query, &record.vector),
        ));
    }

    scored.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    let mut seen = HashSet::new();
    scored.retain(|(path, _, _)| seen.insert(path.clone()));

    if skipped > 0 {
        debug!(skipped, "embedding records excluded from semantic ranking");
    }

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, (path, title, score))| SemanticHit {
            path,
            title,
            score,
            rank: idx + 1,
        })
        .collect()
}

/// Reciprocal rank fusion over ranked path lists.
///
/// Each list contributes `1 / (k + rank + 1)` with 0-based ranks. A path
/// repeated within one list only counts at its best rank.
pub fn rrf_fuse(k: f64, lists: &[Vec<String>]) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in lists {
        let mut seen = HashSet::new();
        for (rank, path) in list.iter().enumerate() {
            if !seen.insert(path.as_str()) {
                continue;
            }
            *scores.entry(path.clone()).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }
    }
    debug!(lists = lists.len(), fused = scores.len(), "rrf fusion");
    scores
}

/// [`rrf_fuse`] sorted by score descending, ties by path.
pub fn rrf_rank(k: f64, lists: &[Vec<String>]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = rrf_fuse(k, lists).into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

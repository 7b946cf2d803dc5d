//! Keyword search over note titles and bodies.
//!
//! Each index snapshot owns a private in-memory SQLite database with an FTS5
//! table (`porter unicode61` tokenizer, so "running" matches "run").
//! Ranking uses `bm25()` with titles weighted above bodies; scores are
//! reported positive, larger is better.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{Note, Page, Paging};
use crate::query::compile_query;

/// Tokenizable view of a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub path: String,
    pub title: String,
    pub body: String,
    pub content_hash: String,
    /// Build generation in which this content was first seen.
    pub generation: u64,
}

impl SearchDocument {
    pub fn from_note(note: &Note, generation: u64) -> Self {
        Self {
            path: note.path.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            content_hash: note.content_hash.clone(),
            generation,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents present after the update.
    pub indexed: usize,
    /// Documents whose text was (re)tokenized.
    pub tokenized: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub path: String,
    pub title: String,
    /// Excerpt with matched spans wrapped in `[` and `]`.
    pub snippet: String,
    pub score: f64,
    /// 1-based position in the full ranking.
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    pool: SqlitePool,
}

impl LexicalIndex {
    pub async fn open_in_memory() -> KnowledgeResult<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // Every connection to `:memory:` is a separate database, so the pool
        // holds exactly one connection for its whole life.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/lexical").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the index in line with `documents`.
    ///
    /// Documents whose title and content hash are unchanged keep their
    /// tokens; anything not in `documents` is removed.
    pub async fn index_documents(&self, documents: &[SearchDocument]) -> KnowledgeResult<IndexReport> {
        let mut tx = self.pool.begin().await?;

        let existing: HashMap<String, (String, String)> =
            sqlx::query_as::<_, (String, String, String)>(
                "SELECT path, title, content_hash FROM documents",
            )
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|(path, title, hash)| (path, (title, hash)))
            .collect();

        let mut report = IndexReport::default();
        for doc in documents {
            let unchanged = existing
                .get(&doc.path)
                .is_some_and(|(title, hash)| *title == doc.title && *hash == doc.content_hash);

            if !unchanged {
                sqlx::query("DELETE FROM notes_fts WHERE path = ?")
                    .bind(&doc.path)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO notes_fts (path, title, body) VALUES (?, ?, ?)")
                    .bind(&doc.path)
                    .bind(&doc.title)
                    .bind(&doc.body)
                    .execute(&mut *tx)
                    .await?;
                report.tokenized += 1;
            }

            sqlx::query(
                r#"INSERT INTO documents (path, title, content_hash, generation)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(path) DO UPDATE SET
                     title = excluded.title,
                     content_hash = excluded.content_hash,
                     generation = excluded.generation"#,
            )
            .bind(&doc.path)
            .bind(&doc.title)
            .bind(&doc.content_hash)
            .bind(doc.generation as i64)
            .execute(&mut *tx)
            .await?;
        }

        let keep: HashSet<&str> = documents.iter().map(|doc| doc.path.as_str()).collect();
        for path in existing.keys().filter(|path| !keep.contains(path.as_str())) {
            sqlx::query("DELETE FROM notes_fts WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            report.removed += 1;
        }

        tx.commit().await?;

        report.indexed = keep.len();
        debug!(
            indexed = report.indexed,
            tokenized = report.tokenized,
            removed = report.removed,
            "lexical index updated"
        );
        Ok(report)
    }

    pub async fn document_count(&self) -> KnowledgeResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    /// `(path, content_hash, generation)` for every document, sorted by path.
    pub async fn documents(&self) -> KnowledgeResult<Vec<(String, String, u64)>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT path, content_hash, generation FROM documents ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(path, hash, generation)| (path, hash, generation.max(0) as u64))
            .collect())
    }

    /// Ranked keyword search. An empty query yields an empty page.
    pub async fn search(
        &self,
        query: &str,
        paging: Paging,
        snippet_tokens: usize,
    ) -> KnowledgeResult<Page<LexicalHit>> {
        let Some(expr) = compile_query(query)? else {
            return Ok(Page::empty());
        };

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notes_fts WHERE notes_fts MATCH ?")
                .bind(&expr)
                .fetch_one(&self.pool)
                .await
                .map_err(match_error)?;

        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            r#"SELECT d.path, d.title,
                      snippet(notes_fts, -1, '[', ']', '…', ?) AS excerpt,
                      bm25(notes_fts, 0.0, 4.0, 1.0) AS score
               FROM notes_fts
               JOIN documents d ON d.path = notes_fts.path
               WHERE notes_fts MATCH ?
               ORDER BY score ASC, d.path ASC
               LIMIT ? OFFSET ?"#,
        )
        .bind(snippet_tokens.clamp(1, 64) as i64)
        .bind(&expr)
        .bind(i64::try_from(paging.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(paging.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(match_error)?;

        let items: Vec<LexicalHit> = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (path, title, snippet, score))| LexicalHit {
                path,
                title,
                snippet,
                score: positive_score(score),
                rank: paging.offset + idx + 1,
            })
            .collect();

        debug!(query = %query, fts = %expr, total, returned = items.len(), "lexical search");

        Ok(Page {
            returned_count: items.len(),
            total_count: total.max(0) as usize,
            items,
        })
    }

    /// Every path matching `query`, unranked. An empty query matches nothing.
    pub async fn matching_paths(&self, query: &str) -> KnowledgeResult<Vec<String>> {
        let Some(expr) = compile_query(query)? else {
            return Ok(Vec::new());
        };
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM notes_fts WHERE notes_fts MATCH ? ORDER BY path")
                .bind(&expr)
                .fetch_all(&self.pool)
                .await
                .map_err(match_error)?;
        Ok(rows.into_iter().map(|(path,)| path).collect())
    }
}

/// FTS5 reports rejected expressions as database errors.
fn match_error(err: sqlx::Error) -> KnowledgeError {
    match &err {
        sqlx::Error::Database(db) if db.message().contains("fts5") => {
            KnowledgeError::MalformedQuery(db.message().to_string())
        }
        _ => KnowledgeError::Sqlx(err),
    }
}

/// `bm25()` is negative with lower meaning better.
fn positive_score(raw: f64) -> f64 {
    let score = -raw;
    if score.is_finite() { score.max(0.0) } else { 0.0 }
}

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::IndexHandle;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::lexical::LexicalHit;
use crate::models::{Page, PageRequest, Paging};
use crate::semantic::{SemanticHit, rrf_rank, semantic_rank};

/// One fused search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridHit {
    pub path: String,
    pub title: String,
    /// Reciprocal rank fusion score.
    pub score: f64,
    /// 1-based rank in the keyword list, if the note appeared there.
    pub lexical_rank: Option<usize>,
    /// 1-based rank in the vector list, if the note appeared there.
    pub semantic_rank: Option<usize>,
    pub snippet: Option<String>,
}

/// Fused results plus the size of the full candidate pool.
///
/// The page is drawn from at most `bm25_limit` keyword and `dense_limit`
/// vector candidates. `total_matches` counts every note that matched the
/// query or had a usable vector, so `truncated` tells when the fused list
/// left matches out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridPage {
    #[serde(flatten)]
    pub page: Page<HybridHit>,
    pub total_matches: usize,
    pub truncated: bool,
}

impl IndexHandle {
    /// Keyword search; the limit defaults to `search.max_results`.
    pub async fn lexical_search(&self, query: &str, request: PageRequest) -> KnowledgeResult<Page<LexicalHit>> {
        let search = &self.inner.settings.search;
        self.inner
            .lexical
            .search(query, request.resolve(search.max_results), search.snippet_tokens)
            .await
    }

    /// Vector search over current embeddings.
    pub fn semantic_search(&self, query_vector: &[f32], request: PageRequest) -> KnowledgeResult<Page<SemanticHit>> {
        self.check_query_dim(query_vector)?;
        let hits = semantic_rank(
            &self.inner.index,
            self.inner.embeddings.values(),
            query_vector,
            usize::MAX,
        );
        Ok(request.resolve(self.inner.settings.search.max_results).apply(hits))
    }

    /// Keyword and vector results fused by reciprocal rank.
    ///
    /// Without a query vector only the keyword list contributes. An empty
    /// query with no vector yields an empty page. `total_count` covers the
    /// fused candidates; `total_matches` covers every match.
    pub async fn hybrid_search(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        request: PageRequest,
    ) -> KnowledgeResult<HybridPage> {
        let search = &self.inner.settings.search;
        if let Some(vector) = query_vector {
            self.check_query_dim(vector)?;
        }

        let lexical = self
            .inner
            .lexical
            .search(query, Paging::new(search.bm25_limit, 0), search.snippet_tokens)
            .await?
            .items;

        let mut semantic = match query_vector {
            Some(vector) => semantic_rank(
                &self.inner.index,
                self.inner.embeddings.values(),
                vector,
                usize::MAX,
            ),
            None => Vec::new(),
        };

        let mut matched: HashSet<String> = self
            .inner
            .lexical
            .matching_paths(query)
            .await?
            .into_iter()
            .collect();
        matched.extend(semantic.iter().map(|hit| hit.path.clone()));
        semantic.truncate(search.dense_limit);

        let lists = [
            lexical.iter().map(|hit| hit.path.clone()).collect::<Vec<_>>(),
            semantic.iter().map(|hit| hit.path.clone()).collect::<Vec<_>>(),
        ];
        let fused = rrf_rank(search.rrf_k as f64, &lists);

        let lexical_by_path: HashMap<&str, &LexicalHit> =
            lexical.iter().map(|hit| (hit.path.as_str(), hit)).collect();
        let semantic_by_path: HashMap<&str, &SemanticHit> =
            semantic.iter().map(|hit| (hit.path.as_str(), hit)).collect();

        let hits: Vec<HybridHit> = fused
            .into_iter()
            .map(|(path, score)| {
                let lexical_hit = lexical_by_path.get(path.as_str());
                let semantic_hit = semantic_by_path.get(path.as_str());
                let title = lexical_hit
                    .map(|hit| hit.title.clone())
                    .or_else(|| semantic_hit.map(|hit| hit.title.clone()))
                    .unwrap_or_default();
                HybridHit {
                    title,
                    score,
                    lexical_rank: lexical_hit.map(|hit| hit.rank),
                    semantic_rank: semantic_hit.map(|hit| hit.rank),
                    snippet: lexical_hit.map(|hit| hit.snippet.clone()),
                    path,
                }
            })
            .collect();

        debug!(
            query = %query,
            lexical = lexical.len(),
            semantic = semantic.len(),
            fused = hits.len(),
            total_matches = matched.len(),
            "hybrid search"
        );

        let total_matches = matched.len().max(hits.len());
        Ok(HybridPage {
            truncated: total_matches > hits.len(),
            total_matches,
            page: request.resolve(search.max_results).apply(hits),
        })
    }

    fn check_query_dim(&self, vector: &[f32]) -> KnowledgeResult<()> {
        match self.inner.settings.embedding_dim {
            Some(expected) if expected != vector.len() => Err(KnowledgeError::EmbeddingDimMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineSettings;
    use crate::embeddings::tests::{LetterCounts, letter_vector};
    use crate::models::Note;

    async fn handle() -> IndexHandle {
        let notes = vec![
            Note::new("rust.md", "Rust").with_body("Ownership and borrowing keep memory safe."),
            Note::new("garden.md", "Garden").with_body("Tomatoes and basil grow in the sun."),
            Note::new("memory.md", "Memory").with_body("Notes about memory and recall."),
        ];
        IndexHandle::build(notes, EngineSettings::default())
            .await
            .unwrap()
            .refresh_embeddings(&LetterCounts)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn keyword_only_hybrid_keeps_lexical_order() {
        let handle = handle().await;
        let page = handle
            .hybrid_search("memory", None, PageRequest::default())
            .await
            .unwrap()
            .page;
        let paths: Vec<&str> = page.items.iter().map(|hit| hit.path.as_str()).collect();
        assert_eq!(page.total_count, 2);
        assert!(paths.contains(&"memory.md") && paths.contains(&"rust.md"));
        assert!(page.items.iter().all(|hit| hit.semantic_rank.is_none()));
        assert!(page.items.iter().all(|hit| hit.snippet.is_some()));
        assert_eq!(page.items[0].lexical_rank, Some(1));
    }

    #[tokio::test]
    async fn fused_results_include_vector_only_matches() {
        let handle = handle().await;
        let query = letter_vector("Garden\n\nTomatoes and basil grow in the sun.");
        let page = handle
            .hybrid_search("ownership", Some(&query), PageRequest::new(10, 0))
            .await
            .unwrap()
            .page;

        let garden = page.items.iter().find(|hit| hit.path == "garden.md").unwrap();
        assert_eq!(garden.semantic_rank, Some(1));
        assert!(garden.lexical_rank.is_none());

        let rust = page.items.iter().find(|hit| hit.path == "rust.md").unwrap();
        assert_eq!(rust.lexical_rank, Some(1));
        assert!(rust.semantic_rank.is_some());
        assert!(rust.score > garden.score);
        assert!(page.items.iter().all(|hit| hit.score.is_finite()));
    }

    #[tokio::test]
    async fn empty_query_without_vector_is_empty() {
        let handle = handle().await;
        let result = handle.hybrid_search("", None, PageRequest::default()).await.unwrap();
        assert_eq!(result.page.total_count, 0);
        assert_eq!(result.total_matches, 0);
        assert!(!result.truncated);
        assert!(result.page.items.is_empty());
    }

    #[tokio::test]
    async fn capped_candidates_still_report_every_match() {
        let notes: Vec<Note> = (0..8)
            .map(|idx| Note::new(format!("n{idx}.md"), format!("Note {idx}")).with_body("alpha beta"))
            .collect();
        let mut settings = EngineSettings::default();
        settings.search.bm25_limit = 5;
        settings.search.dense_limit = 3;
        let handle = IndexHandle::build(notes, settings).await.unwrap();

        let keyword = handle.lexical_search("alpha", PageRequest::default()).await.unwrap();
        assert_eq!(keyword.total_count, 8);

        let result = handle
            .hybrid_search("alpha", None, PageRequest::new(20, 0))
            .await
            .unwrap();
        assert_eq!(result.page.total_count, 5);
        assert_eq!(result.page.returned_count, 5);
        assert_eq!(result.total_matches, 8);
        assert!(result.truncated);

        let handle = handle.refresh_embeddings(&LetterCounts).await.unwrap();
        let result = handle
            .hybrid_search("gamma", Some(&letter_vector("alpha beta")), PageRequest::new(20, 0))
            .await
            .unwrap();
        assert_eq!(result.page.total_count, 3);
        assert_eq!(result.total_matches, 8);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn uncapped_results_are_not_truncated() {
        let result = handle()
            .await
            .hybrid_search("memory", None, PageRequest::new(1, 0))
            .await
            .unwrap();
        assert_eq!(result.page.total_count, 2);
        assert_eq!(result.page.returned_count, 1);
        assert_eq!(result.total_matches, 2);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn malformed_query_is_reported() {
        let handle = handle().await;
        let err = handle
            .hybrid_search("memory AND", None, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::MalformedQuery(_)));
    }

    #[tokio::test]
    async fn semantic_search_pages_results() {
        let handle = handle().await;
        let page = handle
            .semantic_search(&letter_vector("memory"), PageRequest::new(1, 1))
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.returned_count, 1);
    }
}

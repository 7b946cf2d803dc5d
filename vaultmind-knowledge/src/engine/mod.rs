use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::EngineSettings;
use crate::bridge::{self, CrossLayerReport, FrontmatterSuggestion, ProsePattern, ReverseLinkSuggestion};
use crate::embeddings::{EmbeddingProducer, embed_notes};
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::graph::{
    self, BidirectionalPair, ConnectionStrength, CommonNeighbor, ForwardLink, NoteDegree,
    PairPage, ShortestPath, UnresolvedLink,
};
use crate::index::{Backlink, VaultIndex};
use crate::lexical::{IndexReport, LexicalIndex, SearchDocument};
use crate::models::{Note, NotePage, Page, PageRequest, Paging};
use crate::resolver::{self, EntityMention, LinkSuggestion};
use crate::schema::{self, FolderSchema, IncompleteNote};
use crate::semantic::{EmbeddingRecord, is_current};

pub(crate) mod search;

pub use search::{HybridHit, HybridPage};

/// Shared handle to one immutable index snapshot.
///
/// Clones are cheap and point at the same snapshot. `rebuild` and
/// `with_embeddings` return a new handle; handles already given out keep
/// answering from the snapshot they were created with.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    inner: Arc<Snapshot>,
}

#[derive(Debug)]
struct Snapshot {
    index: Arc<VaultIndex>,
    lexical: LexicalIndex,
    /// Path -> (content hash, generation in which that content appeared).
    documents: Arc<HashMap<String, (String, u64)>>,
    embeddings: Arc<HashMap<String, EmbeddingRecord>>,
    settings: Arc<EngineSettings>,
    generation: u64,
    report: IndexReport,
}

impl IndexHandle {
    /// Build the first snapshot from parsed notes.
    pub async fn build(notes: Vec<Note>, settings: EngineSettings) -> KnowledgeResult<Self> {
        Self::assemble(
            notes,
            Arc::new(settings),
            &HashMap::new(),
            Arc::new(HashMap::new()),
            0,
            None,
        )
        .await
    }

    /// Build a new snapshot from `notes`, keeping generations of unchanged
    /// notes and embeddings of notes that still exist.
    pub async fn rebuild(&self, notes: Vec<Note>) -> KnowledgeResult<Self> {
        let paths: HashSet<&str> = notes.iter().map(|note| note.path.as_str()).collect();
        let embeddings: HashMap<String, EmbeddingRecord> = self
            .inner
            .embeddings
            .iter()
            .filter(|(path, _)| paths.contains(path.as_str()))
            .map(|(path, record)| (path.clone(), record.clone()))
            .collect();
        Self::assemble(
            notes,
            Arc::clone(&self.inner.settings),
            &self.inner.documents,
            Arc::new(embeddings),
            self.inner.generation,
            Some(&self.inner.lexical),
        )
        .await
    }

    async fn assemble(
        notes: Vec<Note>,
        settings: Arc<EngineSettings>,
        previous: &HashMap<String, (String, u64)>,
        embeddings: Arc<HashMap<String, EmbeddingRecord>>,
        previous_generation: u64,
        previous_lexical: Option<&LexicalIndex>,
    ) -> KnowledgeResult<Self> {
        let index = VaultIndex::build(notes);

        let changed = index.len() != previous.len()
            || index.notes().any(|note| {
                previous
                    .get(&note.path)
                    .is_none_or(|(hash, _)| *hash != note.content_hash)
            });
        let generation = if changed || previous_generation == 0 {
            previous_generation + 1
        } else {
            previous_generation
        };

        let documents: HashMap<String, (String, u64)> = index
            .notes()
            .map(|note| {
                let born = match previous.get(&note.path) {
                    Some((hash, born)) if *hash == note.content_hash => *born,
                    _ => generation,
                };
                (note.path.clone(), (note.content_hash.clone(), born))
            })
            .collect();

        let search_documents: Vec<SearchDocument> = index
            .notes()
            .map(|note| {
                let born = documents
                    .get(&note.path)
                    .map(|(_, born)| *born)
                    .unwrap_or(generation);
                SearchDocument::from_note(note, born)
            })
            .collect();

        // older handles keep reading their own database, so it is only
        // shared when nothing in it would change
        let (lexical, report) = match previous_lexical {
            Some(lexical) if !changed => (
                lexical.clone(),
                IndexReport {
                    indexed: search_documents.len(),
                    tokenized: 0,
                    removed: 0,
                },
            ),
            _ => {
                let lexical = LexicalIndex::open_in_memory().await?;
                let report = lexical.index_documents(&search_documents).await?;
                (lexical, report)
            }
        };

        info!(
            generation,
            notes = index.len(),
            tokenized = report.tokenized,
            embeddings = embeddings.len(),
            "index snapshot ready"
        );

        Ok(Self {
            inner: Arc::new(Snapshot {
                index: Arc::new(index),
                lexical,
                documents: Arc::new(documents),
                embeddings,
                settings,
                generation,
                report,
            }),
        })
    }

    /// Same snapshot with `records` merged into its embeddings.
    ///
    /// Later records for a path replace earlier ones. With a configured
    /// `embedding_dim`, every vector must match it.
    pub fn with_embeddings(&self, records: impl IntoIterator<Item = EmbeddingRecord>) -> KnowledgeResult<Self> {
        let mut embeddings = (*self.inner.embeddings).clone();
        for record in records {
            if let Some(expected) = self.inner.settings.embedding_dim {
                if record.vector.len() != expected {
                    return Err(KnowledgeError::EmbeddingDimMismatch {
                        expected,
                        actual: record.vector.len(),
                    });
                }
            }
            embeddings.insert(record.path.clone(), record);
        }

        let inner = &self.inner;
        Ok(Self {
            inner: Arc::new(Snapshot {
                index: Arc::clone(&inner.index),
                lexical: inner.lexical.clone(),
                documents: Arc::clone(&inner.documents),
                embeddings: Arc::new(embeddings),
                settings: Arc::clone(&inner.settings),
                generation: inner.generation,
                report: inner.report,
            }),
        })
    }

    /// Paths of notes with no embedding or an embedding of older content.
    pub fn stale_embeddings(&self) -> Vec<String> {
        self.inner
            .index
            .notes()
            .filter(|note| {
                self.inner
                    .embeddings
                    .get(&note.path)
                    .is_none_or(|record| !is_current(&self.inner.index, record))
            })
            .map(|note| note.path.clone())
            .collect()
    }

    /// Embed every stale note with `producer` and return the updated handle.
    pub async fn refresh_embeddings<P: EmbeddingProducer>(&self, producer: &P) -> KnowledgeResult<Self> {
        let stale = self.stale_embeddings();
        if stale.is_empty() {
            return Ok(self.clone());
        }
        let notes = stale.iter().filter_map(|path| self.inner.index.note(path));
        let records = embed_notes(
            producer,
            notes,
            self.inner.settings.embedding_batch,
            self.inner.settings.embedding_dim,
        )
        .await?;
        self.with_embeddings(records)
    }

    pub fn index(&self) -> &VaultIndex {
        &self.inner.index
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Increases whenever a rebuild sees added, changed or removed notes.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Generation in which the current content of `path` first appeared.
    pub fn note_generation(&self, path: &str) -> Option<u64> {
        let path = self.inner.index.canonical_path(path)?;
        self.inner.documents.get(path).map(|(_, born)| *born)
    }

    pub fn lexical_report(&self) -> IndexReport {
        self.inner.report
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.inner.index.built_at()
    }

    pub fn note(&self, reference: &str) -> Option<&Note> {
        self.inner.index.find_note(reference)
    }

    fn graph_page(&self, request: PageRequest) -> Paging {
        request.resolve(self.inner.settings.graph.default_limit)
    }

    // ── Entities ─────────────────────────────────────────────────

    pub fn lookup_entity(&self, name: &str) -> Option<&str> {
        self.inner.index.lookup_entity(name)
    }

    pub fn find_mentions(&self, text: &str) -> Vec<EntityMention> {
        resolver::find_mentions(&self.inner.index, text).collect()
    }

    pub fn suggest_links(&self, path: &str, request: PageRequest) -> NotePage<LinkSuggestion> {
        resolver::suggest_links(&self.inner.index, path, self.graph_page(request))
    }

    // ── Graph ────────────────────────────────────────────────────

    pub fn backlinks(&self, path: &str, request: PageRequest) -> NotePage<Backlink> {
        graph::backlinks(&self.inner.index, path, self.graph_page(request))
    }

    pub fn forward_links(&self, path: &str, request: PageRequest) -> NotePage<ForwardLink> {
        graph::forward_links(&self.inner.index, path, self.graph_page(request))
    }

    /// Shortest link path; `max_depth` defaults to the configured bound.
    pub fn shortest_path(&self, from: &str, to: &str, max_depth: Option<usize>) -> ShortestPath {
        let depth = max_depth.unwrap_or(self.inner.settings.graph.max_depth);
        graph::shortest_path(&self.inner.index, from, to, depth)
    }

    pub fn common_neighbors(&self, a: &str, b: &str, request: PageRequest) -> PairPage<CommonNeighbor> {
        graph::common_neighbors(&self.inner.index, a, b, self.graph_page(request))
    }

    pub fn connection_strength(&self, a: &str, b: &str) -> ConnectionStrength {
        graph::connection_strength(&self.inner.index, a, b, &self.inner.settings.graph)
    }

    pub fn orphans(&self, folder: Option<&str>, request: PageRequest) -> Page<NoteDegree> {
        graph::orphans(&self.inner.index, folder, self.graph_page(request))
    }

    pub fn hubs(&self, min_links: usize, request: PageRequest) -> Page<NoteDegree> {
        graph::hubs(&self.inner.index, min_links, self.graph_page(request))
    }

    pub fn dead_ends(&self, min_backlinks: usize, request: PageRequest) -> Page<NoteDegree> {
        graph::dead_ends(&self.inner.index, min_backlinks, self.graph_page(request))
    }

    pub fn sources(&self, min_outlinks: usize, request: PageRequest) -> Page<NoteDegree> {
        graph::sources(&self.inner.index, min_outlinks, self.graph_page(request))
    }

    pub fn bidirectional_pairs(&self, path: Option<&str>, request: PageRequest) -> Page<BidirectionalPair> {
        graph::bidirectional_pairs(&self.inner.index, path, self.graph_page(request))
    }

    pub fn unresolved_links(&self, request: PageRequest) -> Page<UnresolvedLink> {
        graph::unresolved_links(&self.inner.index, self.graph_page(request))
    }

    // ── Schema ───────────────────────────────────────────────────

    pub fn infer_schema(&self, folder: Option<&str>) -> FolderSchema {
        schema::infer_schema(&self.inner.index, folder, &self.inner.settings.schema)
    }

    pub fn incomplete_notes(
        &self,
        folder: Option<&str>,
        required: Option<&[String]>,
        request: PageRequest,
    ) -> Page<IncompleteNote> {
        schema::incomplete_notes(
            &self.inner.index,
            folder,
            required,
            &self.inner.settings.schema,
            self.graph_page(request),
        )
    }

    // ── Bridge ───────────────────────────────────────────────────

    /// Prose patterns in a note body; `None` for an unknown note.
    pub fn prose_patterns(&self, path: &str) -> Option<Vec<ProsePattern>> {
        self.inner
            .index
            .note(path)
            .map(|note| bridge::detect_prose_patterns(&note.body))
    }

    pub fn suggest_frontmatter(&self, path: &str, request: PageRequest) -> NotePage<FrontmatterSuggestion> {
        bridge::suggest_frontmatter(&self.inner.index, path, self.graph_page(request))
    }

    pub fn suggest_reverse_links(&self, path: &str, request: PageRequest) -> NotePage<ReverseLinkSuggestion> {
        bridge::suggest_reverse_links(&self.inner.index, path, self.graph_page(request))
    }

    pub fn validate_cross_layer(&self, path: &str) -> CrossLayerReport {
        bridge::validate_cross_layer(&self.inner.index, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::tests::LetterCounts;

    fn notes() -> Vec<Note> {
        vec![
            Note::new("Alex.md", "Alex").with_link("Sam", 1).with_body("Alex works with [[Sam]]."),
            Note::new("Sam.md", "Sam").with_body("Sam is a gardener."),
        ]
    }

    #[tokio::test]
    async fn rebuild_without_changes_keeps_generation() {
        let handle = IndexHandle::build(notes(), EngineSettings::default()).await.unwrap();
        assert_eq!(handle.generation(), 1);

        let same = handle.rebuild(notes()).await.unwrap();
        assert_eq!(same.generation(), 1);
        assert_eq!(same.note_generation("Sam.md"), Some(1));
        assert_eq!(handle.lexical_report().tokenized, 2);
        assert_eq!(
            same.lexical_report(),
            IndexReport {
                indexed: 2,
                tokenized: 0,
                removed: 0
            }
        );
        let hits = same
            .lexical_search("gardener", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(hits.total_count, 1);

        let mut changed = notes();
        changed[1] = Note::new("Sam.md", "Sam").with_body("Sam moved to the city.");
        let next = same.rebuild(changed).await.unwrap();
        assert_eq!(next.generation(), 2);
        assert_eq!(next.note_generation("Alex.md"), Some(1));
        assert_eq!(next.note_generation("Sam.md"), Some(2));
        assert_eq!(next.lexical_report().tokenized, 2);

        // the old handle still answers from its own snapshot
        assert_eq!(handle.note("Sam.md").unwrap().body, "Sam is a gardener.");
    }

    #[tokio::test]
    async fn delegates_fill_default_limits() {
        let settings = EngineSettings {
            graph: vaultmind_core::GraphDefaults {
                default_limit: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let handle = IndexHandle::build(notes(), settings).await.unwrap();
        let page = handle.orphans(None, PageRequest::default());
        assert_eq!(page.total_count, 1);
        assert_eq!(page.returned_count, 1);
        assert_eq!(handle.backlinks("Sam.md", PageRequest::default()).page.total_count, 1);
        assert!(handle.shortest_path("Alex", "Sam", None).exists);
    }

    #[tokio::test]
    async fn embeddings_track_content() {
        let handle = IndexHandle::build(notes(), EngineSettings::default()).await.unwrap();
        assert_eq!(handle.stale_embeddings(), vec!["Alex.md", "Sam.md"]);

        let handle = handle.refresh_embeddings(&LetterCounts).await.unwrap();
        assert!(handle.stale_embeddings().is_empty());

        let mut changed = notes();
        changed[0] = Note::new("Alex.md", "Alex").with_body("rewritten");
        let rebuilt = handle.rebuild(changed).await.unwrap();
        assert_eq!(rebuilt.stale_embeddings(), vec!["Alex.md"]);
    }

    #[tokio::test]
    async fn configured_dimension_is_enforced() {
        let settings = EngineSettings {
            embedding_dim: Some(3),
            ..Default::default()
        };
        let handle = IndexHandle::build(notes(), settings).await.unwrap();
        let err = handle
            .with_embeddings(vec![EmbeddingRecord {
                path: "Alex.md".into(),
                content_hash: "x".into(),
                vector: vec![1.0, 2.0],
            }])
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::EmbeddingDimMismatch { expected: 3, actual: 2 }));
    }
}

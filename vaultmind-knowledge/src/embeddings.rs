use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::EngineSettings;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::Note;
use crate::semantic::EmbeddingRecord;

/// Something that turns texts into vectors, one per input, in order.
pub trait EmbeddingProducer {
    fn embed(&self, inputs: &[String]) -> impl Future<Output = KnowledgeResult<Vec<Vec<f32>>>> + Send;
}

/// Client for an Ollama-compatible `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(KnowledgeError::Embedding(
            "embedding response missing vectors".to_string(),
        ))
    }
}

impl EmbeddingProducer for EmbeddingClient {
    fn embed(&self, inputs: &[String]) -> impl Future<Output = KnowledgeResult<Vec<Vec<f32>>>> + Send {
        self.embed_batch(inputs)
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

/// Text embedded for a note.
pub fn embedding_input(note: &Note) -> String {
    if note.body.trim().is_empty() {
        note.title.clone()
    } else {
        format!("{}\n\n{}", note.title, note.body)
    }
}

/// Embed `notes` in batches of `batch`, keyed by their current content hash.
///
/// When `expected_dim` is set every vector must have that length.
pub async fn embed_notes<'a, P: EmbeddingProducer>(
    producer: &P,
    notes: impl IntoIterator<Item = &'a Note>,
    batch: usize,
    expected_dim: Option<usize>,
) -> KnowledgeResult<Vec<EmbeddingRecord>> {
    let notes: Vec<&Note> = notes.into_iter().collect();
    let mut records = Vec::with_capacity(notes.len());

    for chunk in notes.chunks(batch.max(1)) {
        let inputs: Vec<String> = chunk.iter().map(|note| embedding_input(note)).collect();
        let vectors = producer.embed(&inputs).await?;
        if vectors.len() != chunk.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} vectors, got {}",
                chunk.len(),
                vectors.len()
            )));
        }

        for (note, vector) in chunk.iter().zip(vectors) {
            if let Some(expected) = expected_dim {
                if vector.len() != expected {
                    return Err(KnowledgeError::EmbeddingDimMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
            records.push(EmbeddingRecord {
                path: note.path.clone(),
                content_hash: note.content_hash.clone(),
                vector,
            });
        }
        debug!(batch = chunk.len(), total = records.len(), "embedded note batch");
    }

    Ok(records)
}

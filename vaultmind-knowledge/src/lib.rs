//! Vault graph and hybrid search engine for VaultMind.

pub mod bridge;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod index;
pub mod lexical;
pub mod loader;
pub mod models;
pub mod parser;
pub mod paths;
pub mod query;
pub mod regions;
pub mod resolver;
pub mod schema;
pub mod semantic;

pub use vaultmind_core::config::{EngineSettings, GraphDefaults, SchemaDefaults, SearchDefaults};
pub use errors::{KnowledgeError, KnowledgeResult};
pub use models::{Note, NotePage, Page, PageRequest, Paging, Value};
pub use engine::{HybridHit, HybridPage, IndexHandle};
pub use embeddings::{EmbeddingClient, EmbeddingProducer};
pub use index::VaultIndex;
pub use loader::{ParseFailure, VaultLoad, load_vault};
pub use semantic::EmbeddingRecord;

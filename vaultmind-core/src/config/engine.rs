//! Engine configuration types.
//!
//! These types define the resolved (non-optional) settings used by
//! `vaultmind-knowledge`. They are created from the user-facing
//! `EngineToolsSettings` TOML structs via `From`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::settings::{
    EngineGraphSettings, EngineSchemaSettings, EngineSearchSettings, EngineToolsSettings,
};

/// Resolved engine settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    /// Vault directory scanned by the loader. The engine itself never
    /// resolves note paths against it.
    #[serde(default)]
    pub vault_root: Option<PathBuf>,
    /// Directory names skipped while walking the vault (hidden directories
    /// are always skipped).
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
    #[serde(default)]
    pub search: SearchDefaults,
    #[serde(default)]
    pub graph: GraphDefaults,
    #[serde(default)]
    pub schema: SchemaDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_dim: None,
            embedding_batch: default_embedding_batch(),
            vault_root: None,
            ignore_dirs: default_ignore_dirs(),
            search: SearchDefaults::default(),
            graph: GraphDefaults::default(),
            schema: SchemaDefaults::default(),
        }
    }
}

/// Resolved search tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_bm25_limit")]
    pub bm25_limit: usize,
    #[serde(default = "default_dense_limit")]
    pub dense_limit: usize,
    /// Approximate number of tokens in a lexical snippet.
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            max_results: default_max_results(),
            bm25_limit: default_bm25_limit(),
            dense_limit: default_dense_limit(),
            snippet_tokens: default_snippet_tokens(),
        }
    }
}

/// Resolved graph analytics knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefaults {
    /// Page size applied when a caller does not pass a limit.
    #[serde(default = "default_graph_limit")]
    pub default_limit: usize,
    /// Hop bound applied to shortest-path queries without an explicit depth.
    #[serde(default = "default_graph_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_direct_link_weight")]
    pub direct_link_weight: f64,
    #[serde(default = "default_shared_tag_weight")]
    pub shared_tag_weight: f64,
    #[serde(default = "default_shared_neighbor_weight")]
    pub shared_neighbor_weight: f64,
}

impl Default for GraphDefaults {
    fn default() -> Self {
        Self {
            default_limit: default_graph_limit(),
            max_depth: default_graph_max_depth(),
            direct_link_weight: default_direct_link_weight(),
            shared_tag_weight: default_shared_tag_weight(),
            shared_neighbor_weight: default_shared_neighbor_weight(),
        }
    }
}

/// Resolved schema inference knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefaults {
    /// Frequency at or above which a field counts as required.
    #[serde(default = "default_required_threshold")]
    pub required_threshold: f64,
    /// Largest distinct-value count for which a field is enumerable.
    #[serde(default = "default_enum_max_distinct")]
    pub enum_max_distinct: usize,
    #[serde(default = "default_example_paths")]
    pub example_paths: usize,
}

impl Default for SchemaDefaults {
    fn default() -> Self {
        Self {
            required_threshold: default_required_threshold(),
            enum_max_distinct: default_enum_max_distinct(),
            example_paths: default_example_paths(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_ignore_dirs() -> Vec<String> {
    vec![".obsidian".to_string(), ".trash".to_string(), ".git".to_string()]
}

fn default_rrf_k() -> usize {
    60
}

fn default_max_results() -> usize {
    10
}

fn default_bm25_limit() -> usize {
    50
}

fn default_dense_limit() -> usize {
    50
}

fn default_snippet_tokens() -> usize {
    12
}

fn default_graph_limit() -> usize {
    50
}

fn default_graph_max_depth() -> usize {
    6
}

fn default_direct_link_weight() -> f64 {
    3.0
}

fn default_shared_tag_weight() -> f64 {
    1.0
}

fn default_shared_neighbor_weight() -> f64 {
    1.5
}

fn default_required_threshold() -> f64 {
    0.9
}

fn default_enum_max_distinct() -> usize {
    10
}

fn default_example_paths() -> usize {
    3
}

impl From<&EngineToolsSettings> for EngineSettings {
    fn from(value: &EngineToolsSettings) -> Self {
        let mut settings = EngineSettings::default();
        if let Some(url) = &value.embedding_url {
            settings.embedding_url = url.clone();
        }
        if let Some(model) = &value.embedding_model {
            settings.embedding_model = model.clone();
        }
        if let Some(dim) = value.embedding_dim {
            settings.embedding_dim = Some(dim);
        }
        if let Some(batch) = value.embedding_batch {
            settings.embedding_batch = batch;
        }
        apply_search_overrides(&mut settings.search, &value.search);
        apply_graph_overrides(&mut settings.graph, &value.graph);
        apply_schema_overrides(&mut settings.schema, &value.schema);
        settings
    }
}

fn apply_search_overrides(search: &mut SearchDefaults, overrides: &EngineSearchSettings) {
    if let Some(rrf_k) = overrides.rrf_k {
        search.rrf_k = rrf_k;
    }
    if let Some(max_results) = overrides.max_results {
        search.max_results = max_results;
    }
    if let Some(bm25_limit) = overrides.bm25_limit {
        search.bm25_limit = bm25_limit;
    }
    if let Some(dense_limit) = overrides.dense_limit {
        search.dense_limit = dense_limit;
    }
    if let Some(snippet_tokens) = overrides.snippet_tokens {
        search.snippet_tokens = snippet_tokens;
    }
}

fn apply_graph_overrides(graph: &mut GraphDefaults, overrides: &EngineGraphSettings) {
    if let Some(limit) = overrides.default_limit {
        // A zero page size would make every list look empty.
        graph.default_limit = limit.max(1);
    }
    if let Some(depth) = overrides.max_depth {
        graph.max_depth = depth;
    }
    if let Some(weight) = overrides.direct_link_weight {
        graph.direct_link_weight = sanitize_weight(weight, graph.direct_link_weight);
    }
    if let Some(weight) = overrides.shared_tag_weight {
        graph.shared_tag_weight = sanitize_weight(weight, graph.shared_tag_weight);
    }
    if let Some(weight) = overrides.shared_neighbor_weight {
        graph.shared_neighbor_weight = sanitize_weight(weight, graph.shared_neighbor_weight);
    }
}

fn apply_schema_overrides(schema: &mut SchemaDefaults, overrides: &EngineSchemaSettings) {
    if let Some(threshold) = overrides.required_threshold {
        if threshold.is_finite() {
            schema.required_threshold = threshold.clamp(0.0, 1.0);
        }
    }
    if let Some(max) = overrides.enum_max_distinct {
        schema.enum_max_distinct = max;
    }
    if let Some(count) = overrides.example_paths {
        schema.example_paths = count;
    }
}

/// Weights must stay finite and non-negative so scores never go negative.
fn sanitize_weight(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

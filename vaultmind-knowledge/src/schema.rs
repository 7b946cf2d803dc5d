//! Front matter schema inference over a folder.
//!
//! Field types are decided by majority vote over non-null observations.
//! Ties go to the type listed first in [`FieldType`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SchemaDefaults;
use crate::index::VaultIndex;
use crate::models::{Note, Page, Paging, Value};
use crate::paths::{file_stem, folder_of, in_folder};

static DATE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("date value regex")
});

static DATE_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}").expect("date stem regex"));

/// Inferred field type, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Date,
    Wikilink,
    WikilinkList,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl FieldType {
    /// Type of one observed value; `None` for nulls.
    pub fn of(value: &Value) -> Option<Self> {
        let kind = match value {
            Value::Null => return None,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(text) => classify_string(text),
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(|item| item.link_target().is_some()) {
                    Self::WikilinkList
                } else {
                    Self::Array
                }
            }
            Value::Map(_) => Self::Object,
        };
        Some(kind)
    }
}

fn classify_string(text: &str) -> FieldType {
    let trimmed = text.trim();
    if DATE_VALUE.is_match(trimmed) {
        FieldType::Date
    } else if crate::parser::wikilink_target(trimmed).is_some() {
        FieldType::Wikilink
    } else if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        FieldType::Boolean
    } else if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        FieldType::Number
    } else {
        FieldType::String
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    pub inferred_type: FieldType,
    /// Share of notes in scope that carry the field.
    pub frequency: f64,
    pub confidence: f64,
    pub is_required: bool,
    /// Present only for enumerable fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_values: Option<Vec<ValueCount>>,
    pub example_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingKind {
    DateStamp,
    FixedPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPattern {
    pub kind: NamingKind,
    /// `YYYY-MM-DD` or `PREFIX` followed by `*` for the variable part.
    pub template: String,
    pub matched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSchema {
    pub folder: String,
    pub note_count: usize,
    pub fields: Vec<FieldSummary>,
    pub naming_pattern: Option<NamingPattern>,
}

impl FolderSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSummary> {
        self.fields.iter().filter(|field| field.is_required)
    }
}

#[derive(Default)]
struct FieldStats<'a> {
    present: usize,
    votes: HashMap<FieldType, usize>,
    observed: usize,
    values: BTreeMap<String, usize>,
    scalar_observations: usize,
    examples: Vec<&'a str>,
}

impl<'a> FieldStats<'a> {
    fn observe(&mut self, path: &'a str, value: &Value, example_limit: usize) {
        self.present += 1;
        if self.examples.len() < example_limit {
            self.examples.push(path);
        }
        let Some(kind) = FieldType::of(value) else {
            return;
        };
        self.observed += 1;
        *self.votes.entry(kind).or_default() += 1;

        let scalars: Vec<String> = match value {
            Value::Array(items) => items
                .iter()
                .filter(|item| !matches!(item, Value::Array(_) | Value::Map(_) | Value::Null))
                .map(ToString::to_string)
                .collect(),
            Value::Map(_) => Vec::new(),
            other => vec![other.to_string()],
        };
        for scalar in scalars {
            self.scalar_observations += 1;
            *self.values.entry(scalar).or_default() += 1;
        }
    }

    fn winner(&self) -> (FieldType, usize) {
        self.votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(kind, count)| (*kind, *count))
            .unwrap_or((FieldType::String, 0))
    }
}

fn scope_notes<'a>(index: &'a VaultIndex, folder: Option<&str>) -> Vec<&'a Note> {
    index
        .notes()
        .filter(|note| folder.is_none_or(|folder| in_folder(&note.path, folder)))
        .collect()
}

/// Infer the front matter schema of `folder` (or the whole vault).
pub fn infer_schema(index: &VaultIndex, folder: Option<&str>, options: &SchemaDefaults) -> FolderSchema {
    let notes = scope_notes(index, folder);
    let folder_name = folder.unwrap_or("").trim_matches('/').to_string();

    let mut stats: BTreeMap<&str, FieldStats<'_>> = BTreeMap::new();
    for note in &notes {
        for (key, value) in &note.metadata {
            stats
                .entry(key.as_str())
                .or_default()
                .observe(&note.path, value, options.example_paths);
        }
    }

    let total = notes.len();
    let mut fields: Vec<FieldSummary> = stats
        .into_iter()
        .map(|(name, stats)| summarize(name, &stats, total, options))
        .collect();
    fields.sort_by(|a, b| {
        b.frequency
            .total_cmp(&a.frequency)
            .then_with(|| a.name.cmp(&b.name))
    });

    let naming_pattern = detect_naming_pattern(notes.iter().filter_map(|note| {
        folder_of(&note.path)
            .trim_matches('/')
            .eq_ignore_ascii_case(&folder_name)
            .then(|| file_stem(&note.path))
    }));

    debug!(folder = %folder_name, notes = total, fields = fields.len(), "schema inferred");

    FolderSchema {
        folder: folder_name,
        note_count: total,
        fields,
        naming_pattern,
    }
}

fn summarize(name: &str, stats: &FieldStats<'_>, total: usize, options: &SchemaDefaults) -> FieldSummary {
    let frequency = if total == 0 {
        0.0
    } else {
        stats.present as f64 / total as f64
    };
    let (inferred_type, votes) = stats.winner();
    let consistency = if stats.observed == 0 {
        0.0
    } else {
        votes as f64 / stats.observed as f64
    };

    let distinct = stats.values.len();
    let enumerable = distinct > 0
        && distinct <= options.enum_max_distinct
        && distinct < stats.scalar_observations;
    let common_values = enumerable.then(|| {
        let mut values: Vec<ValueCount> = stats
            .values
            .iter()
            .map(|(value, count)| ValueCount {
                value: value.clone(),
                count: *count,
            })
            .collect();
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        values
    });

    FieldSummary {
        name: name.to_string(),
        inferred_type,
        frequency,
        confidence: (frequency * consistency).clamp(0.0, 1.0),
        is_required: frequency >= options.required_threshold,
        common_values,
        example_paths: stats.examples.iter().map(|path| path.to_string()).collect(),
    }
}

/// Shared date stamp or fixed prefix across file stems; `None` unless every
/// file fits.
pub fn detect_naming_pattern<'a>(stems: impl IntoIterator<Item = &'a str>) -> Option<NamingPattern> {
    let stems: Vec<&str> = stems.into_iter().collect();
    let total = stems.len();
    if total < 2 {
        return None;
    }

    if stems.iter().all(|stem| DATE_STEM.is_match(stem)) {
        let rests: BTreeSet<&str> = stems.iter().map(|stem| &stem[10..]).collect();
        let template = match rests.iter().next() {
            Some(rest) if rests.len() == 1 => format!("YYYY-MM-DD{rest}"),
            _ => "YYYY-MM-DD*".to_string(),
        };
        return Some(NamingPattern {
            kind: NamingKind::DateStamp,
            template,
            matched: total,
            total,
        });
    }

    let prefix = common_prefix(&stems);
    let cut = prefix
        .char_indices()
        .filter(|(_, ch)| matches!(ch, '-' | '_' | ' ' | '.'))
        .map(|(idx, ch)| idx + ch.len_utf8())
        .last()?;
    let prefix = &prefix[..cut];
    if prefix.trim_matches(['-', '_', ' ', '.']).chars().count() < 2 {
        return None;
    }
    Some(NamingPattern {
        kind: NamingKind::FixedPrefix,
        template: format!("{prefix}*"),
        matched: total,
        total,
    })
}

fn common_prefix<'a>(stems: &[&'a str]) -> &'a str {
    let Some(first) = stems.first() else {
        return "";
    };
    let mut end = first.len();
    for stem in &stems[1..] {
        end = first
            .char_indices()
            .zip(stem.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((idx, a), _)| idx + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(end);
    }
    &first[..end]
}

// ── Incomplete notes ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub name: String,
    pub suggested_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteNote {
    pub path: String,
    pub title: String,
    /// Share of expected fields present, in `[0, 1)`.
    pub completeness: f64,
    pub present_fields: Vec<String>,
    pub missing_fields: Vec<MissingField>,
}

/// Notes in `folder` missing expected fields, least complete first.
///
/// Expected fields are `required` when given, otherwise the fields the
/// inferred schema marks as required.
pub fn incomplete_notes(
    index: &VaultIndex,
    folder: Option<&str>,
    required: Option<&[String]>,
    options: &SchemaDefaults,
    paging: Paging,
) -> Page<IncompleteNote> {
    let schema = infer_schema(index, folder, options);
    let expected: Vec<(String, FieldType)> = match required {
        Some(names) => names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| {
                let kind = schema
                    .field(name)
                    .map(|field| field.inferred_type)
                    .unwrap_or(FieldType::String);
                (name.to_string(), kind)
            })
            .collect(),
        None => schema
            .required_fields()
            .map(|field| (field.name.clone(), field.inferred_type))
            .collect(),
    };
    if expected.is_empty() {
        return Page::empty();
    }

    let mut incomplete: Vec<IncompleteNote> = scope_notes(index, folder)
        .into_iter()
        .filter_map(|note| {
            let missing: Vec<MissingField> = expected
                .iter()
                .filter(|(name, _)| !note.metadata.contains_key(name))
                .map(|(name, kind)| MissingField {
                    name: name.clone(),
                    suggested_type: *kind,
                })
                .collect();
            if missing.is_empty() {
                return None;
            }
            let present = expected.len() - missing.len();
            Some(IncompleteNote {
                path: note.path.clone(),
                title: note.title.clone(),
                completeness: present as f64 / expected.len() as f64,
                present_fields: note.metadata.keys().cloned().collect(),
                missing_fields: missing,
            })
        })
        .collect();

    incomplete.sort_by(|a, b| {
        a.completeness
            .total_cmp(&b.completeness)
            .then_with(|| a.path.cmp(&b.path))
    });
    paging.apply(incomplete)
}

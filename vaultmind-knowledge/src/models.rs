use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::{compute_hash, wikilink_target};

// ── Metadata values ──────────────────────────────────────────────

/// Front matter value.
///
/// A closed set of shapes so that type inference can match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Target of a `[[...]]` string, if this value is one.
    pub fn link_target(&self) -> Option<String> {
        self.as_str().and_then(wikilink_target)
    }

    /// Scalar strings of this value, flattening one level of arrays.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            Self::String(value) => vec![value.as_str()],
            Self::Array(values) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            Self::String(value) => write!(f, "{value}"),
            Self::Array(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

// ── Note records ─────────────────────────────────────────────────

/// One wikilink occurrence in a note body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutLink {
    pub target: String,
    /// 1-based line in the source file.
    pub line: usize,
}

/// A parsed note. Identity is the vault-relative `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub path: String,
    pub title: String,
    pub aliases: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
    pub outlinks: Vec<OutLink>,
    pub tags: BTreeSet<String>,
    pub modified: DateTime<Utc>,
    pub body: String,
    pub content_hash: String,
}

impl Note {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            aliases: Vec::new(),
            metadata: BTreeMap::new(),
            outlinks: Vec::new(),
            tags: BTreeSet::new(),
            modified: DateTime::<Utc>::UNIX_EPOCH,
            body: String::new(),
            content_hash: compute_hash(""),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_link(mut self, target: impl Into<String>, line: usize) -> Self {
        self.outlinks.push(OutLink {
            target: target.into(),
            line,
        });
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_hash = compute_hash(&self.body);
        self
    }

    /// File name without directories or the `.md` extension.
    pub fn file_stem(&self) -> &str {
        crate::paths::file_stem(&self.path)
    }
}

// ── Pagination ───────────────────────────────────────────────────

/// Caller-facing page request; a missing limit falls back to a configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    pub fn resolve(self, default_limit: usize) -> Paging {
        Paging {
            limit: self.limit.unwrap_or(default_limit),
            offset: self.offset,
        }
    }
}

/// Concrete paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: usize,
    pub offset: usize,
}

impl Paging {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Slice a fully computed result set.
    pub fn apply<T>(self, items: Vec<T>) -> Page<T> {
        let total_count = items.len();
        let items: Vec<T> = items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Page {
            returned_count: items.len(),
            total_count,
            items,
        }
    }
}

/// One page of a list result together with the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub returned_count: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            returned_count: 0,
        }
    }
}

/// A page scoped to one note; `exists` is false when the note is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePage<T> {
    pub exists: bool,
    pub path: String,
    #[serde(flatten)]
    pub page: Page<T>,
}

impl<T> NotePage<T> {
    pub fn missing(path: &str) -> Self {
        Self {
            exists: false,
            path: path.to_string(),
            page: Page::empty(),
        }
    }
}

//! Moving facts between prose (`Key: Value` lines) and front matter.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::index::VaultIndex;
use crate::models::{Note, NotePage, Paging, Value};
use crate::parser::wikilink_target;
use crate::regions::{LineIndex, SkipRegions};

/// Keys longer than this many words read as sentences, not fields.
const MAX_KEY_WORDS: usize = 5;
const MAX_KEY_CHARS: usize = 64;

/// Front matter keys that describe the note itself rather than point
/// at other notes.
const IDENTITY_KEYS: &[&str] = &["title", "alias", "aliases", "tag", "tags"];

/// A `Key: Value` line in a note body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProsePattern {
    pub key: String,
    /// Value as written, link brackets included.
    pub value: String,
    pub is_link: bool,
    /// 1-based line within the scanned text.
    pub line: usize,
}

impl ProsePattern {
    pub fn link_target(&self) -> Option<String> {
        if self.is_link {
            wikilink_target(&self.value)
        } else {
            None
        }
    }
}

/// Scan `text` for `Key: Value` lines outside code.
///
/// Headings are skipped and list bullets are stripped. A value made only of
/// comma-separated links yields one pattern per link.
pub fn detect_prose_patterns(text: &str) -> Vec<ProsePattern> {
    let regions = SkipRegions::scan(text);
    let lines = LineIndex::new(text);
    let mut patterns = Vec::new();

    let mut offset = 0;
    for raw_line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();

        let line = raw_line.trim_end_matches(['\n', '\r']);
        let indent = line.len() - line.trim_start().len();
        let content = line.trim_start();
        if content.starts_with('#') || regions.in_code(line_start + indent) {
            continue;
        }

        let (content, content_start) = strip_bullet(content, line_start + indent);
        let Some((key, colon)) = split_key(content) else {
            continue;
        };
        let colon_pos = content_start + colon;
        if regions.contains(colon_pos) || regions.contains(content_start) {
            continue;
        }

        let value = content[colon + 1..].trim();
        if value.is_empty() {
            continue;
        }
        let line_no = lines.line_of(line_start);

        match split_links(value) {
            Some(links) => patterns.extend(links.into_iter().map(|link| ProsePattern {
                key: key.to_string(),
                value: link.to_string(),
                is_link: true,
                line: line_no,
            })),
            None => patterns.push(ProsePattern {
                key: key.to_string(),
                value: value.to_string(),
                is_link: false,
                line: line_no,
            }),
        }
    }

    patterns
}

fn strip_bullet(content: &str, start: usize) -> (&str, usize) {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(rest) = content.strip_prefix(bullet) {
            let trimmed = rest.trim_start();
            return (trimmed, start + content.len() - trimmed.len());
        }
    }
    (content, start)
}

/// Key and the byte offset of its colon, when `content` opens with `Key: `.
fn split_key(content: &str) -> Option<(&str, usize)> {
    let colon = content.find(':')?;
    if !content[colon + 1..].starts_with([' ', '\t']) {
        return None;
    }
    let key = content[..colon].trim_end();
    let mut chars = key.chars();
    if !chars.next().is_some_and(char::is_alphabetic) {
        return None;
    }
    if !chars.all(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_')) {
        return None;
    }
    if key.chars().count() > MAX_KEY_CHARS || key.split_whitespace().count() > MAX_KEY_WORDS {
        return None;
    }
    Some((key, colon))
}

/// Individual links when `value` is nothing but comma-separated `[[...]]`.
fn split_links(value: &str) -> Option<Vec<&str>> {
    let links: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    (!links.is_empty() && links.iter().all(|part| wikilink_target(part).is_some())).then_some(links)
}

/// Front matter key for a prose key: lowercased, whitespace runs as `_`.
pub fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn has_field(note: &Note, key: &str) -> bool {
    note.metadata
        .keys()
        .any(|existing| normalize_key(existing) == key)
}

// ── Prose -> front matter ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontmatterSuggestion {
    pub key: String,
    /// A string for a single occurrence, an array when the key repeats.
    pub value: Value,
    pub lines: Vec<usize>,
}

/// Front matter fields that the note's prose states but its metadata lacks.
pub fn suggest_frontmatter(index: &VaultIndex, path: &str, paging: Paging) -> NotePage<FrontmatterSuggestion> {
    let Some(note) = index.note(path) else {
        return NotePage::missing(path);
    };

    let mut grouped: BTreeMap<String, (Vec<String>, Vec<usize>)> = BTreeMap::new();
    for pattern in detect_prose_patterns(&note.body) {
        let key = normalize_key(&pattern.key);
        if has_field(note, &key) {
            continue;
        }
        let (values, lines) = grouped.entry(key).or_default();
        if !values.contains(&pattern.value) {
            values.push(pattern.value);
        }
        if !lines.contains(&pattern.line) {
            lines.push(pattern.line);
        }
    }

    let suggestions: Vec<FrontmatterSuggestion> = grouped
        .into_iter()
        .map(|(key, (mut values, lines))| {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::from(values)
            };
            FrontmatterSuggestion { key, value, lines }
        })
        .collect();

    NotePage {
        exists: true,
        path: note.path.clone(),
        page: paging.apply(suggestions),
    }
}

// ── Front matter -> links ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseLinkSuggestion {
    pub field: String,
    pub value: String,
    pub target: String,
    /// Replacement text, e.g. `[[Alex Johnson]]`.
    pub suggested: String,
}

/// Plain metadata values naming a known entity, proposed as links.
pub fn suggest_reverse_links(index: &VaultIndex, path: &str, paging: Paging) -> NotePage<ReverseLinkSuggestion> {
    let Some(note) = index.note(path) else {
        return NotePage::missing(path);
    };

    let mut suggestions = Vec::new();
    for (field, value) in &note.metadata {
        if IDENTITY_KEYS.contains(&field.to_lowercase().as_str()) {
            continue;
        }
        for text in value.strings() {
            if wikilink_target(text).is_some() {
                continue;
            }
            let Some(target) = index.entities().get(&text.trim().to_lowercase()) else {
                continue;
            };
            if *target == note.path {
                continue;
            }
            let title = index
                .note(target)
                .map(|target| target.title.as_str())
                .unwrap_or(text);
            suggestions.push(ReverseLinkSuggestion {
                field: field.clone(),
                value: text.to_string(),
                target: target.clone(),
                suggested: format!("[[{title}]]"),
            });
        }
    }

    NotePage {
        exists: true,
        path: note.path.clone(),
        page: paging.apply(suggestions),
    }
}

// ── Cross-layer validation ───────────────────────────────────────

/// Entities referenced by a note, split by which layer mentions them.
///
/// References resolve to note paths where possible; unresolved ones keep
/// their link target text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLayerReport {
    pub exists: bool,
    pub path: String,
    pub consistent: Vec<String>,
    pub frontmatter_only: Vec<String>,
    pub prose_only: Vec<String>,
}

pub fn validate_cross_layer(index: &VaultIndex, path: &str) -> CrossLayerReport {
    let Some(note) = index.note(path) else {
        return CrossLayerReport {
            exists: false,
            path: path.to_string(),
            consistent: Vec::new(),
            frontmatter_only: Vec::new(),
            prose_only: Vec::new(),
        };
    };

    let mut front = BTreeSet::new();
    for (field, value) in &note.metadata {
        if IDENTITY_KEYS.contains(&field.to_lowercase().as_str()) {
            continue;
        }
        for text in value.strings() {
            if let Some(reference) = reference_key(index, text) {
                front.insert(reference);
            }
        }
    }

    let prose: BTreeSet<String> = detect_prose_patterns(&note.body)
        .iter()
        .filter_map(|pattern| reference_key(index, &pattern.value))
        .collect();

    CrossLayerReport {
        exists: true,
        path: note.path.clone(),
        consistent: front.intersection(&prose).cloned().collect(),
        frontmatter_only: front.difference(&prose).cloned().collect(),
        prose_only: prose.difference(&front).cloned().collect(),
    }
}

/// Identity of a referenced entity: link targets always count, plain text
/// only when it names a known entity.
fn reference_key(index: &VaultIndex, text: &str) -> Option<String> {
    match wikilink_target(text) {
        Some(target) => Some(
            index
                .lookup_entity(&target)
                .map(str::to_string)
                .unwrap_or(target),
        ),
        None => index
            .entities()
            .get(&text.trim().to_lowercase())
            .cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_key_value_lines() {
        let text = "# Heading: not this\n\
                    Owner: [[Alex Johnson]]\n\
                    - Status: in progress\n\
                    Reviewers: [[Sam]], [[Kim|K]]\n\
                    This long sentence has a trailing colon: so it is prose\n\
                    https://example.com: nope\n\
                    Empty:\n";
        let found: Vec<(String, String, bool, usize)> = detect_prose_patterns(text)
            .into_iter()
            .map(|p| (p.key, p.value, p.is_link, p.line))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Owner".into(), "[[Alex Johnson]]".into(), true, 2),
                ("Status".into(), "in progress".into(), false, 3),
                ("Reviewers".into(), "[[Sam]]".into(), true, 4),
                ("Reviewers".into(), "[[Kim|K]]".into(), true, 4),
            ]
        );
    }

    #[test]
    fn skips_code() {
        let text = "```\nOwner: Alex\n```\n`Owner: Alex`\nlead-dev: Sam\n";
        let found = detect_prose_patterns(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "lead-dev");
        assert_eq!(found[0].line, 5);
    }

    fn vault() -> VaultIndex {
        VaultIndex::build(vec![
            Note::new("Alex.md", "Alex Johnson").with_alias("AJ"),
            Note::new("Sam.md", "Sam"),
            Note::new("Kim.md", "Kim"),
            Note::new("project.md", "Project")
                .with_field("owner", "[[Alex Johnson]]")
                .with_field("sponsor", "Sam")
                .with_field("reviewer", vec!["AJ", "[[Kim]]", "Nobody"])
                .with_field("title", "Project")
                .with_body("Owner: [[Alex Johnson]]\nReviewer: [[Kim]]\nHelper: [[Zed]]\nPhase: beta\nPhase: [[Launch]]\n"),
            Note::new("bare.md", "Bare"),
        ])
    }

    #[test]
    fn frontmatter_suggestions_group_repeats_and_skip_known_fields() {
        let index = vault();
        let page = suggest_frontmatter(&index, "project.md", Paging::new(10, 0));
        assert!(page.exists);
        let keys: Vec<&str> = page.page.items.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["helper", "phase"]);
        assert_eq!(page.page.items[0].value, Value::from("[[Zed]]"));
        assert_eq!(page.page.items[1].value, Value::from(vec!["beta", "[[Launch]]"]));
        assert_eq!(page.page.items[1].lines, vec![4, 5]);

        assert!(!suggest_frontmatter(&index, "nope.md", Paging::new(10, 0)).exists);
    }

    #[test]
    fn reverse_links_skip_existing_link_syntax() {
        let index = vault();
        let page = suggest_reverse_links(&index, "project.md", Paging::new(10, 0));
        let found: Vec<(&str, &str, &str)> = page
            .page
            .items
            .iter()
            .map(|s| (s.field.as_str(), s.value.as_str(), s.suggested.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("reviewer", "AJ", "[[Alex Johnson]]"),
                ("sponsor", "Sam", "[[Sam]]"),
            ]
        );
    }

    #[test]
    fn cross_layer_partitions_references() {
        let index = vault();
        let report = validate_cross_layer(&index, "project.md");
        assert!(report.exists);
        assert_eq!(report.consistent, vec!["Alex.md", "Kim.md"]);
        assert_eq!(report.frontmatter_only, vec!["Sam.md"]);
        assert_eq!(report.prose_only, vec!["Launch", "Zed"]);
    }

    #[test]
    fn cross_layer_is_total() {
        let index = vault();
        let report = validate_cross_layer(&index, "bare.md");
        assert!(report.exists);
        assert!(report.consistent.is_empty());
        assert!(report.frontmatter_only.is_empty());
        assert!(report.prose_only.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["consistent"].is_array());
        assert!(json["frontmatter_only"].is_array());
        assert!(json["prose_only"].is_array());

        assert!(!validate_cross_layer(&index, "missing.md").exists);
    }
}

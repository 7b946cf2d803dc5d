//! Entity mention scanning.
//!
//! Finds note titles and aliases inside free text. Matching is
//! case-insensitive, prefers the longest entity name starting at a word, and
//! only accepts a match that ends on a word boundary. A boundary is any
//! non-alphanumeric character or the edge of the text; `-` is a boundary,
//! `_` is not. Code, URLs and existing wikilinks are never scanned (see
//! [`crate::regions`]). Once a match is accepted the scan resumes after it,
//! so mentions never overlap.
//!
//! Offsets are UTF-8 byte offsets into the scanned text.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::VaultIndex;
use crate::models::{NotePage, Paging};
use crate::regions::{LineIndex, SkipRegions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    /// Canonical path of the mentioned note.
    pub entity: String,
    pub start: usize,
    pub end: usize,
    /// Mentioned text with its original casing.
    pub matched_alias: String,
}

#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    path: String,
    chars: usize,
    order: usize,
}

/// Entity names grouped by their first word, or by their leading character
/// when they open with punctuation (`.NET`, `(Draft) Plan`).
#[derive(Debug, Clone, Default)]
pub struct EntityMatcher {
    by_first_word: HashMap<String, Vec<Candidate>>,
    by_lead_char: HashMap<char, Vec<Candidate>>,
}

impl EntityMatcher {
    pub fn new(entities: &BTreeMap<String, String>, order: &HashMap<String, usize>) -> Self {
        let mut by_first_word: HashMap<String, Vec<Candidate>> = HashMap::new();
        let mut by_lead_char: HashMap<char, Vec<Candidate>> = HashMap::new();
        for (key, path) in entities {
            let candidate = Candidate {
                key: key.clone(),
                path: path.clone(),
                chars: key.chars().count(),
                order: order.get(key).copied().unwrap_or(usize::MAX),
            };
            match first_word(key) {
                Some(first) => by_first_word.entry(first.to_string()).or_default().push(candidate),
                None => match key.chars().next() {
                    Some(lead) => by_lead_char.entry(lead).or_default().push(candidate),
                    None => continue,
                },
            }
        }
        for candidates in by_first_word.values_mut().chain(by_lead_char.values_mut()) {
            candidates.sort_by(|a, b| b.chars.cmp(&a.chars).then(a.order.cmp(&b.order)));
        }
        if !by_lead_char.is_empty() {
            debug!(keys = by_lead_char.len(), "entity names indexed by leading punctuation");
        }
        Self {
            by_first_word,
            by_lead_char,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_first_word.is_empty() && self.by_lead_char.is_empty()
    }

    fn starts_entity(&self, ch: char) -> bool {
        self.by_lead_char.contains_key(&ch)
    }
}

pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Leading word of a key; `None` when the key does not start with one.
fn first_word(key: &str) -> Option<&str> {
    let end = key
        .char_indices()
        .find(|(_, ch)| !is_word_char(*ch))
        .map(|(idx, _)| idx)
        .unwrap_or(key.len());
    (end > 0).then(|| &key[..end])
}

/// Scan `text` for entity mentions.
///
/// The returned iterator is lazy and single-pass.
pub fn find_mentions<'a>(index: &'a VaultIndex, text: &'a str) -> MentionScanner<'a> {
    MentionScanner {
        text,
        matcher: index.matcher(),
        regions: SkipRegions::scan(text),
        cursor: 0,
    }
}

pub struct MentionScanner<'a> {
    text: &'a str,
    matcher: &'a EntityMatcher,
    regions: SkipRegions,
    cursor: usize,
}

impl Iterator for MentionScanner<'_> {
    type Item = EntityMention;

    fn next(&mut self) -> Option<Self::Item> {
        if self.matcher.is_empty() {
            self.cursor = self.text.len();
            return None;
        }

        while let Some(start) = next_start(self.text, self.cursor, self.matcher) {
            if let Some(region) = self.regions.region_at(start) {
                self.cursor = region.range.end;
                continue;
            }

            let Some(lead) = self.text[start..].chars().next() else {
                break;
            };
            let (candidates, resume) = if is_word_char(lead) {
                let word_end = start
                    + self.text[start..]
                        .find(|ch: char| !is_word_char(ch))
                        .unwrap_or(self.text.len() - start);
                let word = self.text[start..word_end].to_lowercase();
                (self.matcher.by_first_word.get(&word), word_end)
            } else {
                (self.matcher.by_lead_char.get(&lead), start + lead.len_utf8())
            };

            if let Some(mention) = candidates.and_then(|candidates| self.match_here(start, candidates)) {
                self.cursor = mention.end;
                return Some(mention);
            }
            self.cursor = resume;
        }

        self.cursor = self.text.len();
        None
    }
}

impl MentionScanner<'_> {
    fn match_here(&self, start: usize, candidates: &[Candidate]) -> Option<EntityMention> {
        candidates.iter().find_map(|candidate| {
            let end = match_at(self.text, start, &candidate.key)?;
            if !ends_on_boundary(self.text, end) || self.regions.overlaps(start..end) {
                return None;
            }
            Some(EntityMention {
                entity: candidate.path.clone(),
                start,
                end,
                matched_alias: self.text[start..end].to_string(),
            })
        })
    }
}

/// First offset at or after `from` where a word begins or where a
/// punctuation-led entity name could begin.
fn next_start(text: &str, from: usize, matcher: &EntityMatcher) -> Option<usize> {
    let mut prev_is_word = text[..from].chars().next_back().is_some_and(is_word_char);
    for (offset, ch) in text[from..].char_indices() {
        let word = is_word_char(ch);
        if (word && !prev_is_word) || (!word && matcher.starts_entity(ch)) {
            return Some(from + offset);
        }
        prev_is_word = word;
    }
    None
}

/// End offset if `key` matches case-insensitively at `start`.
///
/// Keys were lowercased as whole strings, so the span is lowercased the same
/// way (a word-final `Σ` becomes `ς`, not `σ`).
fn match_at(text: &str, start: usize, key: &str) -> Option<usize> {
    let rest = &text[start..];
    for (offset, ch) in rest.char_indices() {
        let end = offset + ch.len_utf8();
        let lower = rest[..end].to_lowercase();
        if lower == key {
            return Some(start + end);
        }
        // only the last character's lowercase form depends on what follows
        let tail: usize = ch.to_lowercase().map(char::len_utf8).sum();
        let settled = lower.get(..lower.len().saturating_sub(tail)).unwrap_or("");
        if lower.len() > key.len() || !key.starts_with(settled) {
            return None;
        }
    }
    None
}

fn ends_on_boundary(text: &str, end: usize) -> bool {
    text[end..].chars().next().is_none_or(|ch| !is_word_char(ch))
}

// ── Link suggestions ─────────────────────────────────────────────

/// An unlinked mention of another note inside a note body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub target: String,
    pub title: String,
    pub matched_alias: String,
    /// Byte offsets into the note body.
    pub start: usize,
    pub end: usize,
    /// 1-based line within the body.
    pub line: usize,
}

/// Mentions of other notes in `path`'s body, skipping notes it already links to.
pub fn suggest_links(index: &VaultIndex, path: &str, paging: Paging) -> NotePage<LinkSuggestion> {
    let Some(note) = index.note(path) else {
        return NotePage::missing(path);
    };

    let linked: HashSet<&str> = index.outgoing(&note.path).iter().map(String::as_str).collect();
    let lines = LineIndex::new(&note.body);
    let suggestions: Vec<LinkSuggestion> = find_mentions(index, &note.body)
        .filter(|mention| mention.entity != note.path && !linked.contains(mention.entity.as_str()))
        .map(|mention| LinkSuggestion {
            title: index
                .note(&mention.entity)
                .map(|target| target.title.clone())
                .unwrap_or_default(),
            target: mention.entity,
            matched_alias: mention.matched_alias,
            line: lines.line_of(mention.start),
            start: mention.start,
            end: mention.end,
        })
        .collect();

    NotePage {
        exists: true,
        path: note.path.clone(),
        page: paging.apply(suggestions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    fn index() -> VaultIndex {
        VaultIndex::build(vec![
            Note::new("Alex.md", "Alex"),
            Note::new("Alex Johnson.md", "Alex Johnson"),
            Note::new("Rust.md", "Rust").with_alias("rust-lang"),
            Note::new("snake.md", "snake_case"),
        ])
    }

    fn mentions(text: &str) -> Vec<(String, usize, usize)> {
        let index = index();
        find_mentions(&index, text)
            .map(|m| (m.matched_alias, m.start, m.end))
            .collect()
    }

    #[test]
    fn matches_on_word_boundaries_only() {
        assert!(mentions("Alexy and Lexan").is_empty());
        assert_eq!(mentions("ALEX."), vec![("ALEX".to_string(), 0, 4)]);
    }

    #[test]
    fn prefers_longest_entity() {
        assert_eq!(
            mentions("Contact Alex Johnson, immediately."),
            vec![("Alex Johnson".to_string(), 8, 20)]
        );
    }

    #[test]
    fn hyphen_is_a_boundary_underscore_is_not() {
        assert_eq!(mentions("alex-team"), vec![("alex".to_string(), 0, 4)]);
        assert!(mentions("alex_team").is_empty());
        assert_eq!(mentions("use rust-lang!"), vec![("rust-lang".to_string(), 4, 13)]);
        assert_eq!(mentions("snake_case"), vec![("snake_case".to_string(), 0, 10)]);
    }

    #[test]
    fn skips_code_urls_and_links() {
        let text = "[[Alex]] `Alex` https://alex.io\n```\nAlex\n```\nAlex";
        let found = mentions(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, text.rfind("Alex").unwrap());
    }

    #[test]
    fn empty_input_and_empty_index() {
        assert!(mentions("").is_empty());
        let empty = VaultIndex::build(Vec::new());
        assert_eq!(find_mentions(&empty, "Alex").count(), 0);
    }

    #[test]
    fn never_overlaps() {
        let found = mentions("Alex Johnson Alex");
        assert_eq!(
            found,
            vec![
                ("Alex Johnson".to_string(), 0, 12),
                ("Alex".to_string(), 13, 17),
            ]
        );
    }

    #[test]
    fn matches_names_starting_with_punctuation() {
        let index = VaultIndex::build(vec![
            Note::new("dotnet.md", ".NET Core"),
            Note::new("draft-plan.md", "(Draft) Plan"),
        ]);
        let found: Vec<(String, usize, usize)> =
            find_mentions(&index, "We ship .NET Core and the (Draft) Plan today.")
                .map(|m| (m.entity, m.start, m.end))
                .collect();
        assert_eq!(
            found,
            vec![
                ("dotnet.md".to_string(), 8, 17),
                ("draft-plan.md".to_string(), 26, 38),
            ]
        );
        assert_eq!(find_mentions(&index, "`.NET Core` (Draft)").count(), 0);
    }

    #[test]
    fn final_sigma_matches_uppercase_title() {
        let index = VaultIndex::build(vec![Note::new("odos.md", "ΟΔΟΣ")]);
        let found: Vec<(usize, usize)> = find_mentions(&index, "Στην ΟΔΟΣ σήμερα")
            .map(|m| (m.start, m.end))
            .collect();
        assert_eq!(found, vec![(9, 17)]);
        assert_eq!(find_mentions(&index, "οδος").count(), 1);
        assert!(index.lookup_entity("ΟΔΟΣ").is_some());
    }

    #[test]
    fn suggestions_skip_self_and_existing_links() {
        let index = VaultIndex::build(vec![
            Note::new("Alex.md", "Alex").with_body("Alex met Sam and Kim. See [[Sam]]. Kim again."),
            Note::new("Sam.md", "Sam"),
            Note::new("Kim.md", "Kim"),
        ]);
        let page = suggest_links(&index, "Alex.md", Paging::new(10, 0));
        assert!(page.exists);
        let starts: Vec<usize> = page.page.items.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![17, 35]);
        assert!(page.page.items.iter().all(|s| s.target == "Kim.md"));

        let missing = suggest_links(&index, "Nope.md", Paging::new(10, 0));
        assert!(!missing.exists);
    }
}

//! In-memory vault graph built from parsed notes.
//!
//! A [`VaultIndex`] is an immutable snapshot: building it is the only way to
//! change it. Entity names (titles and aliases) are registered lowercased;
//! when two notes claim the same name the note registered last keeps it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::Note;
use crate::paths::{file_stem, link_key};
use crate::resolver::EntityMatcher;

/// One incoming link occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Backlink {
    pub source: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct VaultIndex {
    notes: BTreeMap<String, Note>,
    /// Lowercased path -> canonical path.
    paths: HashMap<String, String>,
    /// Path-style link keys (`folder/name`, lowercased, no extension) -> path.
    link_paths: HashMap<String, String>,
    /// Lowercased file stem -> path.
    stems: HashMap<String, String>,
    /// Lowercased link target -> occurrences, in note then line order.
    backlinks: BTreeMap<String, Vec<Backlink>>,
    /// Lowercased title or alias -> path.
    entities: BTreeMap<String, String>,
    /// Lowercased entity key -> order of first registration.
    entity_order: HashMap<String, usize>,
    tags: BTreeMap<String, BTreeSet<String>>,
    /// Resolved incoming links per note, self-links excluded.
    incoming: HashMap<String, Vec<Backlink>>,
    /// Resolved distinct outgoing edges per note, self-links excluded.
    outgoing: HashMap<String, Vec<String>>,
    matcher: EntityMatcher,
    built_at: DateTime<Utc>,
}

impl VaultIndex {
    /// Build a snapshot. Later records for the same path replace earlier ones.
    pub fn build(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut ordered: Vec<Note> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for note in notes {
            match positions.get(&note.path) {
                Some(&idx) => ordered[idx] = note,
                None => {
                    positions.insert(note.path.clone(), ordered.len());
                    ordered.push(note);
                }
            }
        }

        let mut paths = HashMap::new();
        let mut link_paths = HashMap::new();
        let mut stems = HashMap::new();
        let mut entities: BTreeMap<String, String> = BTreeMap::new();
        let mut entity_order: HashMap<String, usize> = HashMap::new();
        let mut backlinks: BTreeMap<String, Vec<Backlink>> = BTreeMap::new();
        let mut tags: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for note in &ordered {
            paths.insert(note.path.to_lowercase(), note.path.clone());
            link_paths.insert(link_key(&note.path), note.path.clone());
            stems.insert(file_stem(&note.path).to_lowercase(), note.path.clone());

            let names = std::iter::once(&note.title).chain(note.aliases.iter());
            for name in names {
                let key = name.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                let next = entity_order.len();
                entity_order.entry(key.clone()).or_insert(next);
                if let Some(previous) = entities.insert(key.clone(), note.path.clone()) {
                    if previous != note.path {
                        debug!(entity = %key, previous = %previous, path = %note.path, "entity name re-registered");
                    }
                }
            }

            for link in &note.outlinks {
                let key = link.target.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                backlinks.entry(key).or_default().push(Backlink {
                    source: note.path.clone(),
                    line: link.line,
                });
            }

            for tag in &note.tags {
                tags.entry(tag.clone()).or_default().insert(note.path.clone());
            }
        }

        let notes: BTreeMap<String, Note> = ordered
            .into_iter()
            .map(|note| (note.path.clone(), note))
            .collect();

        let mut index = Self {
            notes,
            paths,
            link_paths,
            stems,
            backlinks,
            entities,
            entity_order,
            tags,
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            matcher: EntityMatcher::default(),
            built_at: Utc::now(),
        };
        index.resolve_edges();
        index.matcher = EntityMatcher::new(&index.entities, &index.entity_order);

        info!(
            notes = index.notes.len(),
            entities = index.entities.len(),
            link_targets = index.backlinks.len(),
            "vault index built"
        );
        index
    }

    fn resolve_edges(&mut self) {
        let mut incoming: HashMap<String, Vec<Backlink>> = HashMap::new();
        for (key, occurrences) in &self.backlinks {
            let Some(target) = self.resolve(key) else {
                continue;
            };
            let list = incoming.entry(target.to_string()).or_default();
            list.extend(
                occurrences
                    .iter()
                    .filter(|backlink| backlink.source != target)
                    .cloned(),
            );
        }
        for list in incoming.values_mut() {
            list.sort();
            list.dedup();
        }

        let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
        for note in self.notes.values() {
            let mut seen = HashSet::new();
            let mut edges = Vec::new();
            for link in &note.outlinks {
                if let Some(target) = self.resolve(&link.target) {
                    if target != note.path && seen.insert(target) {
                        edges.push(target.to_string());
                    }
                }
            }
            outgoing.insert(note.path.clone(), edges);
        }

        self.incoming = incoming;
        self.outgoing = outgoing;
    }

    /// Resolve a link target or entity name to a note path.
    ///
    /// Titles and aliases win; path-style targets (`folder/Note`, with or
    /// without `.md`) and bare file names are tried after that.
    pub fn lookup_entity(&self, name: &str) -> Option<&str> {
        self.resolve(name)
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(path) = self.entities.get(&key) {
            return Some(path.as_str());
        }
        if let Some(path) = self.paths.get(&key) {
            return Some(path.as_str());
        }
        if let Some(path) = self.link_paths.get(&link_key(&key)) {
            return Some(path.as_str());
        }
        self.stems.get(file_stem(&key)).map(String::as_str)
    }

    /// Canonical path for `path`, matched exactly first, then case-insensitively.
    pub fn canonical_path(&self, path: &str) -> Option<&str> {
        if let Some((key, _)) = self.notes.get_key_value(path) {
            return Some(key.as_str());
        }
        self.paths.get(&path.to_lowercase()).map(String::as_str)
    }

    pub fn note(&self, path: &str) -> Option<&Note> {
        self.canonical_path(path).and_then(|path| self.notes.get(path))
    }

    /// Note addressed either by path or by entity name.
    pub fn find_note(&self, reference: &str) -> Option<&Note> {
        self.note(reference)
            .or_else(|| self.lookup_entity(reference).and_then(|path| self.notes.get(path)))
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn backlinks(&self) -> &BTreeMap<String, Vec<Backlink>> {
        &self.backlinks
    }

    pub fn entities(&self) -> &BTreeMap<String, String> {
        &self.entities
    }

    pub fn tags(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.tags
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub(crate) fn matcher(&self) -> &EntityMatcher {
        &self.matcher
    }

    /// Incoming links of a canonical path, sorted by source then line.
    pub fn incoming(&self, path: &str) -> &[Backlink] {
        self.incoming.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct resolved outgoing edges of a canonical path, in link order.
    pub fn outgoing(&self, path: &str) -> &[String] {
        self.outgoing.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Link targets that resolve to no note.
    pub fn dangling_targets(&self) -> impl Iterator<Item = (&str, &[Backlink])> {
        self.backlinks
            .iter()
            .filter(|(key, _)| self.resolve(key).is_none())
            .map(|(key, occurrences)| (key.as_str(), occurrences.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Note> {
        vec![
            Note::new("people/Alex.md", "Alex Johnson")
                .with_alias("AJ")
                .with_link("Sam", 3)
                .with_tag("person"),
            Note::new("people/Sam.md", "Sam")
                .with_link("alex johnson", 1)
                .with_link("people/Alex", 2)
                .with_link("Missing Note", 4)
                .with_tag("person"),
            Note::new("projects/X.md", "Project X").with_link("AJ", 7),
        ]
    }

    #[test]
    fn registers_titles_and_aliases_case_insensitively() {
        let index = VaultIndex::build(sample());
        assert_eq!(index.lookup_entity("ALEX JOHNSON"), Some("people/Alex.md"));
        assert_eq!(index.lookup_entity("aj"), Some("people/Alex.md"));
        assert_eq!(index.lookup_entity("people/Sam.md"), Some("people/Sam.md"));
        assert_eq!(index.lookup_entity("people/sam"), Some("people/Sam.md"));
        assert_eq!(index.lookup_entity("nobody"), None);
        assert_eq!(index.lookup_entity("  "), None);
    }

    #[test]
    fn resolves_incoming_links_across_names() {
        let index = VaultIndex::build(sample());
        assert_eq!(
            index.incoming("people/Alex.md"),
            &[
                Backlink {
                    source: "people/Sam.md".to_string(),
                    line: 1,
                },
                Backlink {
                    source: "people/Sam.md".to_string(),
                    line: 2,
                },
                Backlink {
                    source: "projects/X.md".to_string(),
                    line: 7,
                },
            ]
        );
        assert_eq!(index.outgoing("people/Sam.md"), &["people/Alex.md".to_string()]);
    }

    #[test]
    fn last_registered_note_wins_entity_collision() {
        let index = VaultIndex::build(vec![
            Note::new("a.md", "Shared"),
            Note::new("b.md", "Other").with_alias("shared"),
        ]);
        assert_eq!(index.lookup_entity("Shared"), Some("b.md"));
    }

    #[test]
    fn dangling_targets_are_reported() {
        let index = VaultIndex::build(sample());
        let dangling: Vec<&str> = index.dangling_targets().map(|(key, _)| key).collect();
        assert_eq!(dangling, vec!["missing note"]);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let first = VaultIndex::build(sample());
        let second = VaultIndex::build(sample());
        assert_eq!(first.entities(), second.entities());
        assert_eq!(first.backlinks(), second.backlinks());
        assert_eq!(first.tags(), second.tags());
    }

    #[test]
    fn duplicate_paths_replace_wholesale() {
        let index = VaultIndex::build(vec![
            Note::new("a.md", "Old Title").with_alias("old"),
            Note::new("a.md", "New Title"),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.note("A.MD").map(|n| n.title.as_str()), Some("New Title"));
        assert_eq!(index.lookup_entity("old"), None);
    }
}

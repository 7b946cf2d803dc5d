use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{Note, OutLink, Value};
use crate::paths::file_stem;
use crate::regions::{LineIndex, SkipRegions};

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(,;])#([\p{L}\p{N}_][\p{L}\p{N}_/-]*)").expect("inline tag regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrontMatterFormat {
    Yaml,
    Toml,
}

#[derive(Debug)]
struct SplitNote<'a> {
    front: Option<(FrontMatterFormat, String)>,
    body: &'a str,
    /// Lines that precede the body in the raw file.
    body_line_offset: usize,
}

/// Parse a markdown file into a [`Note`].
///
/// Front matter is optional and may be YAML (`---`) or TOML (`+++`).
pub fn parse_note(raw: &str, path: &str, modified: DateTime<Utc>) -> KnowledgeResult<Note> {
    let split = split_front_matter(raw)?;
    let metadata = match &split.front {
        Some((FrontMatterFormat::Yaml, text)) => parse_yaml_map(text)?,
        Some((FrontMatterFormat::Toml, text)) => parse_toml_map(text)?,
        None => BTreeMap::new(),
    };

    let title = metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(path).to_string());

    let aliases = collect_aliases(&metadata);
    let regions = SkipRegions::scan(split.body);
    let mut tags = collect_front_matter_tags(&metadata);
    tags.extend(extract_inline_tags(split.body, &regions));
    let outlinks = extract_outlinks(split.body, &regions, split.body_line_offset);

    Ok(Note {
        path: path.to_string(),
        title,
        aliases,
        metadata,
        outlinks,
        tags,
        modified,
        body: split.body.to_string(),
        content_hash: compute_hash(raw),
    })
}

pub fn compute_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Target of a string that is exactly one `[[...]]` link.
pub fn wikilink_target(raw: &str) -> Option<String> {
    let inner = raw.trim().strip_prefix("[[")?.strip_suffix("]]")?;
    if inner.contains("[[") || inner.contains("]]") {
        return None;
    }
    link_inner_target(inner)
}

/// Strip display alias and heading/block suffix from link text.
pub(crate) fn link_inner_target(inner: &str) -> Option<String> {
    let target = inner.split('|').next().unwrap_or(inner);
    let target = target.split('#').next().unwrap_or(target);
    let target = target.split('^').next().unwrap_or(target).trim();
    (!target.is_empty()).then(|| target.to_string())
}

fn split_front_matter(raw: &str) -> KnowledgeResult<SplitNote<'_>> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = raw.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(SplitNote {
            front: None,
            body: raw,
            body_line_offset: 0,
        });
    };

    let format = match first.trim_end() {
        "---" => FrontMatterFormat::Yaml,
        "+++" => FrontMatterFormat::Toml,
        _ => {
            return Ok(SplitNote {
                front: None,
                body: raw,
                body_line_offset: 0,
            });
        }
    };

    let mut offset = first.len();
    let mut consumed = 1;
    let mut front_lines = Vec::new();
    for line in lines {
        offset += line.len();
        consumed += 1;
        let trimmed = line.trim_end();
        let closes = match format {
            FrontMatterFormat::Yaml => trimmed == "---" || trimmed == "...",
            FrontMatterFormat::Toml => trimmed == "+++",
        };
        if closes {
            return Ok(SplitNote {
                front: Some((format, front_lines.join(""))),
                body: &raw[offset..],
                body_line_offset: consumed,
            });
        }
        front_lines.push(line);
    }

    Err(KnowledgeError::InvalidFrontMatter(
        "unterminated front matter".to_string(),
    ))
}

fn parse_yaml_map(text: &str) -> KnowledgeResult<BTreeMap<String, Value>> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: serde_yaml::Value = serde_yaml::from_str(text)?;
    match yaml_to_value(parsed) {
        Value::Map(map) => Ok(map),
        Value::Null => Ok(BTreeMap::new()),
        other => Err(KnowledgeError::InvalidFrontMatter(format!(
            "front matter must be a mapping, found {other}"
        ))),
    }
}

fn parse_toml_map(text: &str) -> KnowledgeResult<BTreeMap<String, Value>> {
    let table: toml::Table = toml::from_str(text)?;
    Ok(table
        .into_iter()
        .map(|(key, value)| (key, toml_to_value(value)))
        .collect())
}

fn yaml_to_value(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(value) => Value::Bool(value),
        Yaml::Number(number) => number.as_f64().map(Value::Number).unwrap_or(Value::Null),
        Yaml::String(value) => Value::String(value),
        Yaml::Sequence(items) => {
            // An unquoted `[[Note]]` reads as a nested one-element list.
            if let Some(target) = flow_link(&items) {
                return Value::String(format!("[[{target}]]"));
            }
            Value::Array(items.into_iter().map(yaml_to_value).collect())
        }
        Yaml::Mapping(mapping) => Value::Map(
            mapping
                .into_iter()
                .filter_map(|(key, value)| yaml_key(key).map(|key| (key, yaml_to_value(value))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_value(tagged.value),
    }
}

fn flow_link(items: &[serde_yaml::Value]) -> Option<&str> {
    match items {
        [serde_yaml::Value::Sequence(inner)] => match inner.as_slice() {
            [serde_yaml::Value::String(target)] => Some(target.as_str()),
            _ => None,
        },
        _ => None,
    }
}

fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(key) => Some(key),
        serde_yaml::Value::Bool(key) => Some(key.to_string()),
        serde_yaml::Value::Number(key) => Some(key.to_string()),
        _ => None,
    }
}

fn toml_to_value(value: toml::Value) -> Value {
    match value {
        toml::Value::String(value) => Value::String(value),
        toml::Value::Integer(value) => Value::Number(value as f64),
        toml::Value::Float(value) => Value::Number(value),
        toml::Value::Boolean(value) => Value::Bool(value),
        toml::Value::Datetime(value) => Value::String(value.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_value(value)))
                .collect(),
        ),
    }
}

fn collect_aliases(metadata: &BTreeMap<String, Value>) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    for key in ["aliases", "alias"] {
        let Some(value) = metadata.get(key) else {
            continue;
        };
        for alias in value.strings() {
            let alias = alias.trim();
            if !alias.is_empty() && !aliases.iter().any(|existing| existing == alias) {
                aliases.push(alias.to_string());
            }
        }
    }
    aliases
}

fn collect_front_matter_tags(metadata: &BTreeMap<String, Value>) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for key in ["tags", "tag"] {
        let Some(value) = metadata.get(key) else {
            continue;
        };
        let raw: Vec<String> = match value {
            Value::String(value) => value
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
            Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(ToString::to_string)
                .collect(),
            Value::Number(_) => vec![value.to_string()],
            _ => Vec::new(),
        };
        tags.extend(
            raw.iter()
                .map(|tag| tag.trim().trim_start_matches('#'))
                .filter(|tag| !tag.is_empty())
                .map(str::to_string),
        );
    }
    tags
}

fn extract_inline_tags(body: &str, regions: &SkipRegions) -> BTreeSet<String> {
    INLINE_TAG
        .captures_iter(body)
        .filter_map(|cap| cap.get(1))
        .filter(|tag| !regions.contains(tag.start() - 1))
        .map(|tag| tag.as_str().trim_end_matches(['/', '-']))
        .filter(|tag| !tag.is_empty() && !tag.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

fn extract_outlinks(body: &str, regions: &SkipRegions, line_offset: usize) -> Vec<OutLink> {
    let lines = LineIndex::new(body);
    regions
        .wikilinks()
        .filter_map(|region| {
            let text = &body[region.range.clone()];
            let inner = text
                .trim_start_matches('!')
                .strip_prefix("[[")?
                .strip_suffix("]]")?;
            let target = link_inner_target(inner)?;
            Some(OutLink {
                target,
                line: line_offset + lines.line_of(region.range.start),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Note {
        parse_note(raw, "people/Alex Johnson.md", DateTime::<Utc>::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn parses_yaml_front_matter_and_links() {
        let raw = "---\ntitle: Alex J\naliases: [Alex, AJ]\ntags: [person, team/core]\nrole: \"[[Engineer]]\"\n---\n# Alex\n\nWorks with [[Sam Lee|Sam]] on [[Project X#Goals]].\n";
        let note = parse(raw);

        assert_eq!(note.title, "Alex J");
        assert_eq!(note.aliases, vec!["Alex".to_string(), "AJ".to_string()]);
        assert!(note.tags.contains("person"));
        assert!(note.tags.contains("team/core"));
        assert_eq!(
            note.metadata.get("role"),
            Some(&Value::String("[[Engineer]]".to_string()))
        );
        assert_eq!(
            note.outlinks,
            vec![
                OutLink {
                    target: "Sam Lee".to_string(),
                    line: 9,
                },
                OutLink {
                    target: "Project X".to_string(),
                    line: 9,
                },
            ]
        );
        assert!(note.body.starts_with("# Alex"));
        assert_eq!(note.content_hash, compute_hash(raw));
    }

    #[test]
    fn parses_toml_front_matter() {
        let raw = "+++\ntitle = \"Toml Note\"\ntags = [\"x\"]\npriority = 2\n+++\nBody with #inline tag.\n";
        let note = parse(raw);

        assert_eq!(note.title, "Toml Note");
        assert_eq!(note.metadata.get("priority"), Some(&Value::Number(2.0)));
        assert!(note.tags.contains("x"));
        assert!(note.tags.contains("inline"));
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let note = parse("Just prose, no front matter.\n");
        assert_eq!(note.title, "Alex Johnson");
        assert!(note.metadata.is_empty());
    }

    #[test]
    fn unquoted_yaml_link_becomes_link_string() {
        let note = parse("---\nmanager: [[Sam Lee]]\n---\n");
        assert_eq!(
            note.metadata.get("manager"),
            Some(&Value::String("[[Sam Lee]]".to_string()))
        );
    }

    #[test]
    fn skips_links_and_tags_in_code() {
        let raw = "Real [[One]] #real\n```\n[[Two]] #fake\n```\n`[[Three]]` and https://x.io/#anchor\n";
        let note = parse(raw);

        let targets: Vec<&str> = note.outlinks.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["One"]);
        assert_eq!(note.tags.iter().collect::<Vec<_>>(), vec!["real"]);
    }

    #[test]
    fn embeds_count_as_links() {
        let note = parse("![[diagram.png]]\n");
        assert_eq!(note.outlinks[0].target, "diagram.png");
        assert_eq!(note.outlinks[0].line, 1);
    }

    #[test]
    fn unterminated_front_matter_is_error() {
        let err = parse_note("---\ntitle: x\n", "x.md", Utc::now()).unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidFrontMatter(_)));
    }

    #[test]
    fn non_mapping_front_matter_is_error() {
        let err = parse_note("---\n- a\n- b\n---\n", "x.md", Utc::now()).unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidFrontMatter(_)));
    }

    #[test]
    fn wikilink_target_requires_whole_value() {
        assert_eq!(wikilink_target(" [[Alex]] ").as_deref(), Some("Alex"));
        assert_eq!(wikilink_target("[[A]] and [[B]]"), None);
        assert_eq!(wikilink_target("Alex"), None);
        assert_eq!(wikilink_target("[[]]"), None);
    }

    #[test]
    fn numeric_hashes_are_not_tags() {
        let note = parse("Issue #42 and #todo/\n");
        assert_eq!(note.tags.iter().collect::<Vec<_>>(), vec!["todo"]);
    }
}

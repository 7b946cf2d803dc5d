//! Skip-region scanning for markdown prose.
//!
//! Entity matching, tag extraction and prose-pattern detection all have to
//! ignore the same spans of text. The scanner walks the text once, line by
//! line, and records those spans:
//!
//! - fenced code blocks (```` ``` ```` or `~~~`, closed by a fence of the same
//!   character that is at least as long; an unclosed fence runs to the end),
//! - inline code spans (a backtick run closed by a run of the same length on
//!   the same line),
//! - wikilinks and embeds (`[[...]]`, `![[...]]` on one line),
//! - URLs (`http://`, `https://`, `ftp://`, `mailto:`, `www.` starting at a
//!   word boundary, up to whitespace or a closing delimiter).
//!
//! Regions never overlap and are kept in ascending order.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    CodeFence,
    InlineCode,
    WikiLink,
    Url,
}

impl RegionKind {
    pub fn is_code(self) -> bool {
        matches!(self, Self::CodeFence | Self::InlineCode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SkipRegions {
    regions: Vec<Region>,
}

const URL_PREFIXES: [&str; 5] = ["https://", "http://", "ftp://", "mailto:", "www."];

impl SkipRegions {
    pub fn scan(text: &str) -> Self {
        let mut regions = Vec::new();
        // (marker, run length, start offset)
        let mut fence: Option<(char, usize, usize)> = None;
        let mut line_start = 0;

        for line in text.split_inclusive('\n') {
            let line_end = line_start + line.len();
            let content = line.trim_end_matches(['\n', '\r']);
            let trimmed = content.trim_start();

            match fence {
                Some((marker, len, start)) => {
                    if is_closing_fence(trimmed, marker, len) {
                        regions.push(Region {
                            kind: RegionKind::CodeFence,
                            range: start..line_end,
                        });
                        fence = None;
                    }
                }
                None => {
                    if let Some((marker, len)) = fence_marker(trimmed) {
                        fence = Some((marker, len, line_start));
                    } else {
                        scan_inline(content, line_start, &mut regions);
                    }
                }
            }

            line_start = line_end;
        }

        if let Some((_, _, start)) = fence {
            regions.push(Region {
                kind: RegionKind::CodeFence,
                range: start..text.len(),
            });
        }

        Self { regions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Region covering byte offset `pos`, if any.
    pub fn region_at(&self, pos: usize) -> Option<&Region> {
        let idx = self.regions.partition_point(|region| region.range.start <= pos);
        let candidate = self.regions.get(idx.checked_sub(1)?)?;
        (pos < candidate.range.end).then_some(candidate)
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.region_at(pos).is_some()
    }

    /// Whether any region intersects `range`.
    pub fn overlaps(&self, range: Range<usize>) -> bool {
        if range.is_empty() {
            return self.contains(range.start);
        }
        let idx = self.regions.partition_point(|region| region.range.end <= range.start);
        self.regions
            .get(idx)
            .is_some_and(|region| region.range.start < range.end)
    }

    /// Whether `pos` is inside a code fence or inline code span.
    pub fn in_code(&self, pos: usize) -> bool {
        self.region_at(pos).is_some_and(|region| region.kind.is_code())
    }

    pub fn wikilinks(&self) -> impl Iterator<Item = &Region> {
        self.regions
            .iter()
            .filter(|region| region.kind == RegionKind::WikiLink)
    }
}

fn fence_marker(trimmed: &str) -> Option<(char, usize)> {
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    (run >= 3).then_some((marker, run))
}

fn is_closing_fence(trimmed: &str, marker: char, len: usize) -> bool {
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    run >= len && trimmed[run * marker.len_utf8()..].trim().is_empty()
}

fn scan_inline(line: &str, offset: usize, regions: &mut Vec<Region>) {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < line.len() {
        let rest = &line[i..];

        if bytes[i] == b'`' {
            let run = rest.bytes().take_while(|b| *b == b'`').count();
            if let Some(close) = find_backtick_run(&line[i + run..], run) {
                let end = i + run + close + run;
                regions.push(Region {
                    kind: RegionKind::InlineCode,
                    range: offset + i..offset + end,
                });
                i = end;
            } else {
                i += run;
            }
            continue;
        }

        if rest.starts_with("[[") {
            if let Some(close) = rest[2..].find("]]") {
                let start = if i > 0 && bytes[i - 1] == b'!' { i - 1 } else { i };
                let end = i + 2 + close + 2;
                regions.push(Region {
                    kind: RegionKind::WikiLink,
                    range: offset + start..offset + end,
                });
                i = end;
                continue;
            }
        }

        if at_word_start(line, i) {
            if let Some(len) = url_len(rest) {
                regions.push(Region {
                    kind: RegionKind::Url,
                    range: offset + i..offset + i + len,
                });
                i += len;
                continue;
            }
        }

        i += rest.chars().next().map(char::len_utf8).unwrap_or(1);
    }
}

fn find_backtick_run(haystack: &str, len: usize) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut j = 0;
    while j < bytes.len() {
        if bytes[j] == b'`' {
            let run = bytes[j..].iter().take_while(|b| **b == b'`').count();
            if run == len {
                return Some(j);
            }
            j += run;
        } else {
            j += 1;
        }
    }
    None
}

fn at_word_start(line: &str, i: usize) -> bool {
    line[..i]
        .chars()
        .next_back()
        .is_none_or(|ch| !ch.is_alphanumeric())
}

fn url_len(rest: &str) -> Option<usize> {
    let prefix = URL_PREFIXES.iter().find(|prefix| {
        rest.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })?;

    let raw_end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '`' | ')' | ']'))
        .unwrap_or(rest.len());
    let url = rest[..raw_end].trim_end_matches(['.', ',', ';', ':', '!', '?', '\'']);

    (url.len() > prefix.len()).then_some(url.len())
}

/// Byte offset to 1-based line number lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self { starts }
    }

    pub fn line_of(&self, pos: usize) -> usize {
        self.starts.partition_point(|start| *start <= pos)
    }
}

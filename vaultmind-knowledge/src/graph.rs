//! Link-graph analytics over a [`VaultIndex`] snapshot.
//!
//! Every function here is a pure read. List results are computed in full,
//! then paged, so `total_count` always reflects the unpaginated answer.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::GraphDefaults;
use crate::index::{Backlink, VaultIndex};
use crate::models::{Note, NotePage, Page, Paging};
use crate::paths::in_folder;

// ── Result types ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardLink {
    pub target: String,
    pub line: usize,
    pub exists: bool,
    /// Resolved note path when `exists` is true.
    pub path: Option<String>,
}

/// Link counts for one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDegree {
    pub path: String,
    pub title: String,
    pub backlink_count: usize,
    pub outlink_count: usize,
    pub total_links: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortestPath {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    pub path: Vec<String>,
}

impl ShortestPath {
    fn unreachable() -> Self {
        Self {
            exists: false,
            length: None,
            path: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonNeighbor {
    /// Note title when resolved, otherwise the link text.
    pub target: String,
    pub exists: bool,
    pub path: Option<String>,
}

/// A page scoped to two notes; `exists` is false unless both are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPage<T> {
    pub exists: bool,
    pub a: String,
    pub b: String,
    #[serde(flatten)]
    pub page: Page<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrengthFactors {
    /// Link directions present between the two notes (0, 1 or 2).
    pub direct_links: usize,
    pub shared_tags: usize,
    pub shared_neighbors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStrength {
    pub exists: bool,
    pub score: f64,
    pub factors: StrengthFactors,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidirectionalPair {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedLink {
    pub target: String,
    pub sources: Vec<Backlink>,
}

// ── Per-note queries ─────────────────────────────────────────────

/// Incoming links of a note, sorted by source path then line.
pub fn backlinks(index: &VaultIndex, path: &str, paging: Paging) -> NotePage<Backlink> {
    let Some(note) = index.note(path) else {
        return NotePage::missing(path);
    };
    NotePage {
        exists: true,
        path: note.path.clone(),
        page: paging.apply(index.incoming(&note.path).to_vec()),
    }
}

/// Outgoing links of a note in source order, flagged by whether they resolve.
pub fn forward_links(index: &VaultIndex, path: &str, paging: Paging) -> NotePage<ForwardLink> {
    let Some(note) = index.note(path) else {
        return NotePage::missing(path);
    };
    let links: Vec<ForwardLink> = note
        .outlinks
        .iter()
        .map(|link| {
            let resolved = index.lookup_entity(&link.target).map(str::to_string);
            ForwardLink {
                target: link.target.clone(),
                line: link.line,
                exists: resolved.is_some(),
                path: resolved,
            }
        })
        .collect();
    NotePage {
        exists: true,
        path: note.path.clone(),
        page: paging.apply(links),
    }
}

/// Unweighted shortest link path, following outgoing links only.
///
/// Endpoints may be paths or entity names. Neighbors are visited in link
/// order, so among equally short paths the first one found wins.
pub fn shortest_path(index: &VaultIndex, from: &str, to: &str, max_depth: usize) -> ShortestPath {
    let (Some(start), Some(goal)) = (index.find_note(from), index.find_note(to)) else {
        return ShortestPath::unreachable();
    };
    let start = start.path.as_str();
    let goal = goal.path.as_str();

    if start == goal {
        return ShortestPath {
            exists: true,
            length: Some(0),
            path: vec![start.to_string()],
        };
    }

    let mut parents: HashMap<&str, &str> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut frontier = vec![start];
    let mut depth = 0;

    while depth < max_depth && !frontier.is_empty() {
        depth += 1;
        let mut next_frontier = Vec::new();
        for current in frontier {
            for neighbor in index.outgoing(current) {
                let neighbor = neighbor.as_str();
                if !visited.insert(neighbor) {
                    continue;
                }
                parents.insert(neighbor, current);
                if neighbor == goal {
                    let path = trace_path(&parents, start, goal);
                    debug!(from = start, to = goal, hops = depth, "shortest path found");
                    return ShortestPath {
                        exists: true,
                        length: Some(path.len() - 1),
                        path,
                    };
                }
                next_frontier.push(neighbor);
            }
        }
        frontier = next_frontier;
    }

    ShortestPath::unreachable()
}

fn trace_path(parents: &HashMap<&str, &str>, start: &str, goal: &str) -> Vec<String> {
    let mut path = vec![goal.to_string()];
    let mut current = goal;
    while current != start {
        match parents.get(current) {
            Some(&parent) => {
                current = parent;
                path.push(current.to_string());
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Link targets shared by both notes, in `a`'s link order.
pub fn common_neighbors(index: &VaultIndex, a: &str, b: &str, paging: Paging) -> PairPage<CommonNeighbor> {
    let (Some(left), Some(right)) = (index.find_note(a), index.find_note(b)) else {
        return PairPage {
            exists: false,
            a: a.to_string(),
            b: b.to_string(),
            page: Page::empty(),
        };
    };

    PairPage {
        exists: true,
        a: left.path.clone(),
        b: right.path.clone(),
        page: paging.apply(shared_targets(index, left, right)),
    }
}

fn shared_targets(index: &VaultIndex, left: &Note, right: &Note) -> Vec<CommonNeighbor> {
    let right_keys: HashSet<String> = right
        .outlinks
        .iter()
        .map(|link| neighbor_key(index, &link.target))
        .collect();

    let mut seen = HashSet::new();
    let mut shared = Vec::new();
    for link in &left.outlinks {
        let key = neighbor_key(index, &link.target);
        if !right_keys.contains(&key) || !seen.insert(key) {
            continue;
        }
        let resolved = index.lookup_entity(&link.target).and_then(|path| index.note(path));
        shared.push(match resolved {
            Some(note) => CommonNeighbor {
                target: note.title.clone(),
                exists: true,
                path: Some(note.path.clone()),
            },
            None => CommonNeighbor {
                target: link.target.clone(),
                exists: false,
                path: None,
            },
        });
    }
    shared
}

/// Identity of a link target: the resolved path, or the lowercased link text.
fn neighbor_key(index: &VaultIndex, target: &str) -> String {
    match index.lookup_entity(target) {
        Some(path) => path.to_string(),
        None => format!("unresolved:{}", target.trim().to_lowercase()),
    }
}

/// Weighted relatedness of two notes.
///
/// The score is a weighted sum of link directions between the notes, shared
/// tags and shared link targets. Every factor is a symmetric count, so
/// `connection_strength(a, b) == connection_strength(b, a)`.
pub fn connection_strength(
    index: &VaultIndex,
    a: &str,
    b: &str,
    weights: &GraphDefaults,
) -> ConnectionStrength {
    let (Some(left), Some(right)) = (index.find_note(a), index.find_note(b)) else {
        return ConnectionStrength {
            exists: false,
            score: 0.0,
            factors: StrengthFactors::default(),
        };
    };

    let links_to = |from: &Note, to: &Note| index.outgoing(&from.path).iter().any(|p| *p == to.path);
    let direct_links = usize::from(links_to(left, right)) + usize::from(links_to(right, left));
    let shared_tags = left.tags.intersection(&right.tags).count();
    let shared_neighbors = shared_targets(index, left, right).len();

    let score = weights.direct_link_weight * direct_links as f64
        + weights.shared_tag_weight * shared_tags as f64
        + weights.shared_neighbor_weight * shared_neighbors as f64;

    ConnectionStrength {
        exists: true,
        score: if score.is_finite() { score.max(0.0) } else { 0.0 },
        factors: StrengthFactors {
            direct_links,
            shared_tags,
            shared_neighbors,
        },
    }
}

// ── Vault-wide queries ───────────────────────────────────────────

fn degree(index: &VaultIndex, note: &Note) -> NoteDegree {
    let backlink_count = index.incoming(&note.path).len();
    let outlink_count = note.outlinks.len();
    NoteDegree {
        path: note.path.clone(),
        title: note.title.clone(),
        backlink_count,
        outlink_count,
        total_links: backlink_count + outlink_count,
    }
}

/// Notes nobody links to, optionally restricted to a folder.
pub fn orphans(index: &VaultIndex, folder: Option<&str>, paging: Paging) -> Page<NoteDegree> {
    let items = index
        .notes()
        .filter(|note| folder.is_none_or(|folder| in_folder(&note.path, folder)))
        .map(|note| degree(index, note))
        .filter(|degree| degree.backlink_count == 0)
        .collect();
    paging.apply(items)
}

/// Notes with at least `min_links` incoming plus outgoing links, busiest first.
pub fn hubs(index: &VaultIndex, min_links: usize, paging: Paging) -> Page<NoteDegree> {
    let mut items: Vec<NoteDegree> = index
        .notes()
        .map(|note| degree(index, note))
        .filter(|degree| degree.total_links >= min_links)
        .collect();
    items.sort_by(|a, b| b.total_links.cmp(&a.total_links).then_with(|| a.path.cmp(&b.path)));
    paging.apply(items)
}

/// Notes with at least `min_backlinks` incoming links and no outgoing links.
pub fn dead_ends(index: &VaultIndex, min_backlinks: usize, paging: Paging) -> Page<NoteDegree> {
    let mut items: Vec<NoteDegree> = index
        .notes()
        .map(|note| degree(index, note))
        .filter(|degree| degree.outlink_count == 0 && degree.backlink_count >= min_backlinks)
        .collect();
    items.sort_by(|a, b| {
        b.backlink_count
            .cmp(&a.backlink_count)
            .then_with(|| a.path.cmp(&b.path))
    });
    paging.apply(items)
}

/// Notes with at least `min_outlinks` outgoing links and no incoming links.
pub fn sources(index: &VaultIndex, min_outlinks: usize, paging: Paging) -> Page<NoteDegree> {
    let mut items: Vec<NoteDegree> = index
        .notes()
        .map(|note| degree(index, note))
        .filter(|degree| degree.backlink_count == 0 && degree.outlink_count >= min_outlinks)
        .collect();
    items.sort_by(|a, b| {
        b.outlink_count
            .cmp(&a.outlink_count)
            .then_with(|| a.path.cmp(&b.path))
    });
    paging.apply(items)
}

/// Pairs of notes that link to each other, optionally only those touching `path`.
///
/// An unknown `path` yields an empty page.
pub fn bidirectional_pairs(index: &VaultIndex, path: Option<&str>, paging: Paging) -> Page<BidirectionalPair> {
    let focus = match path {
        Some(path) => match index.find_note(path) {
            Some(note) => Some(note.path.as_str()),
            None => return Page::empty(),
        },
        None => None,
    };

    let mut pairs = BTreeSet::new();
    for note in index.notes() {
        for target in index.outgoing(&note.path) {
            if index.outgoing(target).iter().any(|back| *back == note.path) {
                let (a, b) = if note.path <= *target {
                    (note.path.clone(), target.clone())
                } else {
                    (target.clone(), note.path.clone())
                };
                pairs.insert(BidirectionalPair { a, b });
            }
        }
    }

    let items = pairs
        .into_iter()
        .filter(|pair| focus.is_none_or(|focus| pair.a == focus || pair.b == focus))
        .collect();
    paging.apply(items)
}

/// Link targets that do not resolve to any note.
pub fn unresolved_links(index: &VaultIndex, paging: Paging) -> Page<UnresolvedLink> {
    let items = index
        .dangling_targets()
        .map(|(target, sources)| UnresolvedLink {
            target: target.to_string(),
            sources: sources.to_vec(),
        })
        .collect();
    paging.apply(items)
}

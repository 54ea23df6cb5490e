//! Segment codec: editable text fragments extracted from a page and applied
//! back into the same structure.
//!
//! A segment is addressed one of two ways:
//!
//! - **Positional id** — the path of child indices from the document root to
//!   the text node, joined by `/`, root-adjacent index first, counted over
//!   *all* sibling kinds (text, element, comment). A positional id is a
//!   structural coordinate, not a stable content key: any structural edit
//!   shifts the ids of everything after it.
//! - **Marker id** — pages may tag an element with `data-copy-id="..."` at
//!   authoring time. Text directly under a marked element is addressed by the
//!   marker value (suffixed `.N` when the element has several text children),
//!   which survives structural drift. Marker lookup wins over positional
//!   lookup on apply.
//!
//! Updates are best-effort: an id that matches nothing in the current
//! document is silently ignored. Staleness detection is the caller's job —
//! see [`document_fingerprint`] and the `pages` module.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::dom::{self, Element, Node};
use crate::models::{Segment, SegmentUpdate};

/// Elements whose subtrees are never editable.
const SKIP_TAGS: [&str; 2] = ["script", "style"];

/// Authoring-time marker attribute carrying a persistent segment id.
pub const MARKER_ATTR: &str = "data-copy-id";

fn is_skipped(tag: &str) -> bool {
    SKIP_TAGS.contains(&tag)
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn positional_id(path: &[usize], child_index: usize) -> String {
    let mut parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
    parts.push(child_index.to_string());
    parts.join("/")
}

fn marker_of(el: &Element) -> Option<&str> {
    el.attr(MARKER_ATTR).filter(|m| !m.is_empty())
}

/// Marker-derived id for the `ordinal`-th non-empty text child of a marked
/// element: the bare marker when there is exactly one, `marker.N` otherwise.
fn marker_id(marker: &str, contributing: usize, ordinal: usize) -> String {
    if contributing == 1 {
        marker.to_string()
    } else {
        format!("{}.{}", marker, ordinal)
    }
}

fn contributing_text_children(el: &Element) -> usize {
    el.children
        .iter()
        .filter(|c| matches!(c, Node::Text(raw) if !collapse_whitespace(raw).is_empty()))
        .count()
}

/// Extract the editable text segments of an HTML document in traversal order.
pub fn extract_segments(html: &str) -> Vec<Segment> {
    let nodes = dom::parse(html);
    let mut segments = Vec::new();
    let mut path = Vec::new();
    collect(&nodes, &mut path, &mut segments);
    segments
}

fn collect(nodes: &[Node], path: &mut Vec<usize>, out: &mut Vec<Segment>) {
    for (i, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else { continue };
        if is_skipped(&el.tag) {
            continue;
        }
        path.push(i);

        let marker = marker_of(el);
        let contributing = contributing_text_children(el);
        let mut ordinal = 0;
        for (ci, child) in el.children.iter().enumerate() {
            if let Node::Text(raw) = child {
                let text = collapse_whitespace(raw);
                if text.is_empty() {
                    continue;
                }
                let id = match marker {
                    Some(m) => marker_id(m, contributing, ordinal),
                    None => positional_id(path, ci),
                };
                ordinal += 1;
                out.push(Segment {
                    id,
                    parent_tag: el.tag.clone(),
                    text,
                });
            }
        }

        collect(&el.children, path, out);
        path.pop();
    }
}

/// Apply edited segments to an HTML document and return the new document.
///
/// The raw input is re-parsed from scratch and walked with the exact
/// traversal used by [`extract_segments`], so computed ids line up with the
/// ids the caller was given. Matched text nodes are replaced with the update
/// text, escaped through the serializer's text path: markup delimiters in an
/// edit stay data. Ids that match nothing are ignored.
///
/// An empty update set returns a document that re-extracts to the same
/// segments as the input.
pub fn apply_updates(html: &str, updates: &[SegmentUpdate]) -> String {
    let by_id: HashMap<&str, &str> = updates
        .iter()
        .map(|u| (u.id.as_str(), u.text.as_str()))
        .collect();
    let mut nodes = dom::parse(html);
    let mut path = Vec::new();
    rewrite(&mut nodes, &mut path, &by_id);
    dom::serialize(&nodes)
}

fn rewrite(nodes: &mut [Node], path: &mut Vec<usize>, by_id: &HashMap<&str, &str>) {
    for (i, node) in nodes.iter_mut().enumerate() {
        let Node::Element(el) = node else { continue };
        if is_skipped(&el.tag) {
            continue;
        }
        path.push(i);

        let marker = marker_of(el).map(str::to_string);
        let contributing = contributing_text_children(el);
        let mut ordinal = 0;
        for (ci, child) in el.children.iter_mut().enumerate() {
            if let Node::Text(raw) = child {
                let collapsed = collapse_whitespace(raw);
                if collapsed.is_empty() {
                    continue;
                }
                let by_marker = marker
                    .as_deref()
                    .map(|m| marker_id(m, contributing, ordinal));
                ordinal += 1;

                // Marker lookup takes precedence over the positional path.
                let replacement = by_marker
                    .as_deref()
                    .and_then(|id| by_id.get(id).copied())
                    .or_else(|| by_id.get(positional_id(path, ci).as_str()).copied());
                if let Some(new_text) = replacement {
                    *raw = dom::escape_text(new_text);
                }
            }
        }

        rewrite(&mut el.children, path, by_id);
        path.pop();
    }
}

/// SHA-256 fingerprint of the raw document bytes.
///
/// Identifies the exact revision a set of segment ids was computed against;
/// compare fingerprints before applying edits to detect document drift.
pub fn document_fingerprint(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    hex::encode(hasher.finalize())
}

//! Core data models shared by the codec, the store client, and the CLI.

use serde::{Deserialize, Serialize};

/// An editable unit of plain text extracted from a page, addressed by a
/// structural id (child-index path) or a `data-copy-id` marker id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub parent_tag: String,
    pub text: String,
}

/// An edited segment sent back for application. Ids must come from an
/// extraction of the current document; unknown ids are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentUpdate {
    pub id: String,
    pub text: String,
}

/// A file fetched from the remote store: version token plus decoded content.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub sha: String,
    pub content: String,
}

/// One row of a remote directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// `"file"` or `"dir"` in the contents API.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Editable pages available in the store: content slugs plus the home
/// pseudo-slug, which resolves through the per-locale home paths.
#[derive(Debug, Clone, Serialize)]
pub struct PageIndex {
    pub slugs: Vec<String>,
    pub home: Vec<String>,
}

/// Extraction result for one `(slug, locale)` page.
///
/// `fingerprint` identifies the exact document revision the segment ids were
/// computed against; pass it back to `save_segments` to refuse stale edits.
#[derive(Debug, Clone, Serialize)]
pub struct PageSegments {
    pub slug: String,
    pub locale: String,
    pub path: String,
    pub fingerprint: String,
    pub segments: Vec<Segment>,
}

/// One slideshow manifest row. Captions and ordering metadata vary by site,
/// so everything beyond the filename round-trips untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideEntry {
    pub filename: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Slideshow state: image files present in the store and the manifest rows.
#[derive(Debug, Clone, Serialize)]
pub struct Slideshow {
    pub files: Vec<String>,
    pub manifest: Vec<SlideEntry>,
}

//! Cached pages and the immutable snapshot they are published in.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

/// A rendered page as stored in a snapshot.
///
/// Immutable once published; readers holding an `Arc<Page>` always see the
/// HTML and revision of one render together.
#[derive(Debug, Clone)]
pub struct Page {
    /// Cache key (relative source path, `/`-separated).
    pub path: String,
    /// Rendered HTML fragment.
    pub html: String,
    /// First heading of the document, if any.
    pub title: Option<String>,
    /// Bumped on every committed render of this path.
    pub revision: u64,
    /// blake3 hash of the source bytes this page was rendered from.
    pub hash: blake3::Hash,
}

impl Page {
    /// Title, falling back to the path.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.path)
    }

    /// Hex content hash, used as the HTTP `ETag`.
    pub fn etag(&self) -> String {
        hex::encode(&self.hash.as_bytes()[..16])
    }
}

/// One row of [`PageCache::index`](super::PageCache::index).
///
/// `path` is always a valid key for `get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub path: String,
    pub title: String,
    pub revision: u64,
}

/// Immutable path -> page mapping, swapped wholesale on every commit.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pages: BTreeMap<String, Arc<Page>>,
}

impl Snapshot {
    pub fn new(pages: BTreeMap<String, Arc<Page>>) -> Self {
        Self { pages }
    }

    pub fn get(&self, path: &str) -> Option<&Arc<Page>> {
        self.pages.get(path)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> impl Iterator<Item = &Arc<Page>> {
        self.pages.values()
    }

    /// Copy of this snapshot with `page` inserted (or replaced).
    ///
    /// Only `Arc` handles are cloned, page bodies are shared.
    pub fn with_page(&self, page: Arc<Page>) -> Self {
        let mut pages = self.pages.clone();
        pages.insert(page.path.clone(), page);
        Self { pages }
    }

    /// Copy of this snapshot with `path` removed.
    pub fn without(&self, path: &str) -> Self {
        let mut pages = self.pages.clone();
        pages.remove(path);
        Self { pages }
    }

    /// Flat, path-sorted listing.
    pub fn index(&self) -> Vec<IndexEntry> {
        self.pages
            .values()
            .map(|page| IndexEntry {
                path: page.path.clone(),
                title: page.display_title().to_string(),
                revision: page.revision,
            })
            .collect()
    }
}

//! Rendered page cache with change-driven invalidation.
//!
//! # Architecture
//!
//! ```text
//! rescan_one / rescan_all          get / index
//!        |                              |
//!   [single-flight]                     |
//!        |                              v
//!   read + render  (no lock)     ArcSwap<Snapshot>  (lock-free load)
//!        |                              ^
//!        +--> commit lock --> build --> store --> UpdateBus
//! ```
//!
//! Readers never block. Writers hold the commit lock only while building the
//! next snapshot and swapping it in, never while rendering. Events are
//! published under the commit lock, after the swap, so their order follows
//! commit order.

mod bus;
mod error;
mod flight;
mod page;
mod source;

#[cfg(test)]
mod tests;

pub use bus::{ChannelClosed, UpdateBus, UpdateEvent, UpdateKind, UpdateSource};
pub use error::CacheError;
pub use page::{IndexEntry, Page, Snapshot};
pub use source::{SourceTree, normalize_key};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::compiler::{RenderedPage, Renderer};
use flight::SingleFlight;

/// Per-path commit bookkeeping, outlives evictions.
#[derive(Debug, Default, Clone, Copy)]
struct Ledger {
    /// Highest revision ever committed for the path.
    revision: u64,
    /// Ticket of the render (or eviction) that produced the current state.
    ticket: u64,
}

/// Summary of a full rescan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files discovered by the walk.
    pub discovered: usize,
    /// Pages committed with a new revision.
    pub rendered: usize,
    /// Pages whose source hash was unchanged.
    pub unchanged: usize,
    /// Per-page failures; these paths kept their previous entry, if any.
    pub failed: Vec<CacheError>,
    /// Pages dropped because their source is gone.
    pub removed: usize,
}

enum Outcome {
    Unchanged,
    Rendered(RenderedPage, blake3::Hash),
    Failed(CacheError),
}

/// Path -> rendered HTML cache.
pub struct PageCache {
    tree: SourceTree,
    renderer: Arc<dyn Renderer>,
    snapshot: ArcSwap<Snapshot>,
    flights: SingleFlight<String, Result<Arc<Page>, CacheError>>,
    /// Commit lock; the map tracks revisions across evictions.
    commit: Mutex<FxHashMap<String, Ledger>>,
    tickets: AtomicU64,
    bus: UpdateBus,
}

impl PageCache {
    pub fn new(tree: SourceTree, renderer: Arc<dyn Renderer>, update_buffer: usize) -> Self {
        Self {
            tree,
            renderer,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            flights: SingleFlight::new(),
            commit: Mutex::new(FxHashMap::default()),
            tickets: AtomicU64::new(0),
            bus: UpdateBus::new(update_buffer),
        }
    }

    pub fn tree(&self) -> &SourceTree {
        &self.tree
    }

    /// Cached page for `path`, or `None`. Never blocks, never renders.
    pub fn get(&self, path: &str) -> Option<Arc<Page>> {
        let key = normalize_key(path)?;
        self.snapshot.load().get(&key).cloned()
    }

    /// Known pages with titles, sorted by path.
    pub fn index(&self) -> Vec<IndexEntry> {
        self.snapshot.load().index()
    }

    /// The current snapshot, for callers that need a consistent multi-page view.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Consumer handle for change events. Only the first call gets one.
    pub fn updates(&self) -> Option<UpdateSource> {
        self.bus.subscribe()
    }

    /// Close the update channel; the consumer exits after draining it.
    pub fn close(&self) {
        self.bus.close();
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    // =========================================================================
    // Single page
    // =========================================================================

    /// Re-render one page and publish it.
    ///
    /// Concurrent calls for the same path share one render. On success the
    /// revision is bumped and exactly one event is emitted. On failure the
    /// previous entry stays and nothing is emitted.
    pub fn rescan_one(&self, path: &str) -> Result<Arc<Page>, CacheError> {
        let key = normalize_key(path).ok_or_else(|| CacheError::NotFound(path.to_string()))?;
        self.flights.run(&key, || self.render_and_commit(&key))
    }

    fn render_and_commit(&self, key: &str) -> Result<Arc<Page>, CacheError> {
        let ticket = self.next_ticket();
        let source = self.tree.read(key)?;
        let hash = blake3::hash(&source);
        let rendered = self.renderer.render(&source).map_err(|e| CacheError::Render {
            path: key.to_string(),
            message: e.0,
        })?;

        let mut ledgers = self.commit.lock();
        let current = self.snapshot.load_full();
        let ledger = ledgers.entry(key.to_string()).or_default();

        if ledger.ticket > ticket {
            // A newer render or eviction already landed.
            crate::debug!("cache"; "discarding stale render of {}", key);
            return current
                .get(key)
                .cloned()
                .ok_or_else(|| CacheError::NotFound(key.to_string()));
        }

        ledger.revision += 1;
        ledger.ticket = ticket;
        let page = Arc::new(Page {
            path: key.to_string(),
            html: rendered.html,
            title: rendered.title,
            revision: ledger.revision,
            hash,
        });

        self.snapshot
            .store(Arc::new(current.with_page(Arc::clone(&page))));
        self.bus
            .publish(UpdateEvent::new(key, page.revision, UpdateKind::Updated));

        Ok(page)
    }

    /// Drop a page whose source is gone.
    ///
    /// Emits one `Removed` event if the page was cached; unknown paths are a no-op.
    pub fn evict(&self, path: &str) -> Option<u64> {
        let key = normalize_key(path)?;
        let ticket = self.next_ticket();

        let mut ledgers = self.commit.lock();
        let current = self.snapshot.load_full();
        current.get(&key)?;

        let ledger = ledgers.entry(key.clone()).or_default();
        ledger.revision += 1;
        ledger.ticket = ticket;
        let revision = ledger.revision;

        self.snapshot.store(Arc::new(current.without(&key)));
        self.bus
            .publish(UpdateEvent::new(key, revision, UpdateKind::Removed));

        Some(revision)
    }

    // =========================================================================
    // Full rescan
    // =========================================================================

    /// Walk the source tree, render what changed, swap in a new snapshot.
    ///
    /// Only an unreadable root fails the call (snapshot untouched). Per-page
    /// failures are collected in the report; those paths keep their previous
    /// entry. Unchanged sources are not re-rendered and emit nothing.
    pub fn rescan_all(&self) -> Result<ScanReport, CacheError> {
        let ticket = self.next_ticket();
        let keys = self.tree.walk()?;
        let before = self.snapshot.load_full();

        let outcomes: Vec<(String, Outcome)> = keys
            .into_par_iter()
            .map(|key| {
                let outcome = self.scan_one(&key, &before);
                (key, outcome)
            })
            .collect();

        let mut report = ScanReport {
            discovered: outcomes.len(),
            ..ScanReport::default()
        };

        let mut ledgers = self.commit.lock();
        let latest = self.snapshot.load_full();
        let mut pages = BTreeMap::new();
        let mut events = Vec::new();
        let mut seen = FxHashSet::default();

        for (key, outcome) in outcomes {
            seen.insert(key.clone());
            let committed = latest.get(&key).cloned();

            match outcome {
                Outcome::Unchanged => {
                    report.unchanged += 1;
                    if let Some(page) = committed {
                        pages.insert(key, page);
                    }
                }
                Outcome::Failed(err) => {
                    crate::debug!("cache"; "{}", err);
                    report.failed.push(err);
                    if let Some(page) = committed {
                        pages.insert(key, page);
                    }
                }
                Outcome::Rendered(rendered, hash) => {
                    let ledger = ledgers.entry(key.clone()).or_default();
                    let superseded = ledger.ticket > ticket;
                    let same = committed.as_ref().is_some_and(|p| p.hash == hash);

                    if superseded || same {
                        report.unchanged += 1;
                        if let Some(page) = committed {
                            pages.insert(key, page);
                        }
                        continue;
                    }

                    ledger.revision += 1;
                    ledger.ticket = ticket;
                    events.push(UpdateEvent::new(&key, ledger.revision, UpdateKind::Updated));
                    report.rendered += 1;
                    pages.insert(
                        key.clone(),
                        Arc::new(Page {
                            path: key,
                            html: rendered.html,
                            title: rendered.title,
                            revision: ledger.revision,
                            hash,
                        }),
                    );
                }
            }
        }

        // Pages not found by the walk: keep the ones committed after the walk
        // started, drop the rest.
        for page in latest.pages() {
            if seen.contains(&page.path) {
                continue;
            }
            let newer = ledgers
                .get(&page.path)
                .is_some_and(|ledger| ledger.ticket > ticket);
            if newer {
                pages.insert(page.path.clone(), Arc::clone(page));
            } else {
                report.removed += 1;
            }
        }

        self.snapshot.store(Arc::new(Snapshot::new(pages)));
        for event in events {
            self.bus.publish(event);
        }

        Ok(report)
    }

    fn scan_one(&self, key: &str, before: &Snapshot) -> Outcome {
        let source = match self.tree.read(key) {
            Ok(source) => source,
            Err(e) => return Outcome::Failed(e),
        };
        let hash = blake3::hash(&source);
        if before.get(key).is_some_and(|page| page.hash == hash) {
            return Outcome::Unchanged;
        }
        match self.renderer.render(&source) {
            Ok(rendered) => Outcome::Rendered(rendered, hash),
            Err(e) => Outcome::Failed(CacheError::Render {
                path: key.to_string(),
                message: e.0,
            }),
        }
    }

    /// Callers currently blocked on an in-flight render of `path`.
    #[cfg(test)]
    pub(crate) fn render_waiters(&self, path: &str) -> usize {
        self.flights.waiters(&path.to_string())
    }
}

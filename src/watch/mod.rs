//! Filesystem watcher: source changes become page rescans.
//!
//! ```text
//! notify --> Debouncer (timing, dedup) --> apply_changes --> PageCache
//!                                               |
//!                          created/modified ----+--> rescan_one
//!                          removed -------------+--> evict
//! ```
//!
//! Runs on its own thread and stops when shutdown triggers or the notify
//! backend goes away.

mod debouncer;


use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;

use crate::cache::{CacheError, PageCache};
use crate::core::Shutdown;
use crate::logger::{status_error, status_success};
use debouncer::{ChangeKind, Debouncer};

/// Longest the loop sleeps before checking for shutdown.
const TICK: Duration = Duration::from_millis(200);

/// Watches the cache's source root.
pub struct FsWatcher {
    notify_rx: Receiver<notify::Result<notify::Event>>,
    /// Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    debouncer: Debouncer,
    cache: Arc<PageCache>,
}

impl FsWatcher {
    /// Start watching immediately. Events buffer until [`spawn`](Self::spawn).
    pub fn new(cache: Arc<PageCache>) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        watcher.watch(cache.tree().root(), RecursiveMode::Recursive)?;

        Ok(Self {
            notify_rx,
            _watcher: watcher,
            debouncer: Debouncer::new(),
            cache,
        })
    }

    pub fn spawn(self, shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("watch".into())
            .spawn(move || self.run(&shutdown))
    }

    fn run(mut self, shutdown: &Shutdown) {
        crate::log!("watch"; "watching {}", self.cache.tree().root().display());

        while !shutdown.is_triggered() {
            match self.notify_rx.recv_timeout(self.debouncer.sleep_duration(TICK)) {
                Ok(Ok(event)) => self.debouncer.add_event(&event),
                Ok(Err(e)) => crate::log!("watch"; "notify error: {}", e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(changes) = self.debouncer.take_if_ready() {
                let summary = apply_changes(&self.cache, changes);
                summary.report();
            }
        }
        crate::debug!("watch"; "watcher stopped");
    }
}

/// What one debounced batch did to the cache.
#[derive(Debug, Default)]
pub struct ChangeSummary {
    pub rendered: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<CacheError>,
}

impl ChangeSummary {
    fn is_empty(&self) -> bool {
        self.rendered.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }

    fn report(&self) {
        if self.is_empty() {
            return;
        }
        if !self.failed.is_empty() {
            let detail: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
            status_error(
                &format!("{} page(s) failed to render", self.failed.len()),
                &detail.join("\n"),
            );
            return;
        }

        let mut parts = Vec::new();
        if !self.rendered.is_empty() {
            parts.push(format!("rendered: {}", self.rendered.join(", ")));
        }
        if !self.removed.is_empty() {
            parts.push(format!("removed: {}", self.removed.join(", ")));
        }
        status_success(&parts.join("; "));
    }
}

/// Apply one batch of filesystem changes to the cache.
///
/// Paths are processed in sorted order. A created or modified path that no
/// longer exists is treated as removed.
fn apply_changes(
    cache: &PageCache,
    changes: FxHashMap<PathBuf, ChangeKind>,
) -> ChangeSummary {
    let mut changes: Vec<_> = changes.into_iter().collect();
    changes.sort_by(|a, b| a.0.cmp(&b.0));

    let tree = cache.tree();
    let mut summary = ChangeSummary::default();

    for (path, kind) in changes {
        if kind == ChangeKind::Removed || !path.exists() {
            match tree.key_for(&path) {
                Some(key) => {
                    if cache.evict(&key).is_some() {
                        summary.removed.push(key);
                    }
                }
                // A removed directory takes its pages with it.
                None => summary.removed.extend(evict_under(cache, &path)),
            }
            continue;
        }

        if path.is_dir() {
            continue;
        }
        let Some(key) = tree.key_for(&path) else {
            continue;
        };

        match cache.rescan_one(&key) {
            Ok(page) => {
                crate::debug!("watch"; "{} -> r{}", key, page.revision);
                summary.rendered.push(key);
            }
            Err(e) => summary.failed.push(e),
        }
    }

    summary
}

/// Evict every cached page below directory `dir`.
fn evict_under(cache: &PageCache, dir: &Path) -> Vec<String> {
    let Some(prefix) = relative_prefix(cache.tree().root(), dir) else {
        return Vec::new();
    };

    let keys: Vec<String> = cache
        .snapshot()
        .pages()
        .filter(|page| page.path.starts_with(&prefix))
        .map(|page| page.path.clone())
        .collect();

    keys.into_iter()
        .filter(|key| cache.evict(key).is_some())
        .collect()
}

/// `root/a/b` -> `a/b/`. `None` outside the root or for the root itself.
fn relative_prefix(root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| format!("{}/", parts.join("/")))
}

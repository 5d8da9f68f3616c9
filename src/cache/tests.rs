use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tempfile::TempDir;

use super::*;
use crate::compiler::{MarkdownRenderer, RenderError, RenderedPage, Renderer};

fn make_tree(files: &[(&str, &str)]) -> (TempDir, SourceTree) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    for (path, content) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    let tree = SourceTree::new(root, &["md".to_string()]);
    (temp, tree)
}

fn markdown_cache(files: &[(&str, &str)]) -> (TempDir, PageCache) {
    let (temp, tree) = make_tree(files);
    let cache = PageCache::new(tree, Arc::new(MarkdownRenderer::default()), 1024);
    (temp, cache)
}

fn write(cache: &PageCache, path: &str, content: &str) {
    fs::write(cache.tree().root().join(path), content).unwrap();
}

/// Renders `render-N` where N counts calls; refuses sources containing `BROKEN`.
#[derive(Default)]
struct CountingRenderer {
    calls: AtomicU64,
}

impl Renderer for CountingRenderer {
    fn render(&self, source: &[u8]) -> Result<RenderedPage, RenderError> {
        if source.windows(6).any(|w| w == b"BROKEN") {
            return Err(RenderError("broken source".into()));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RenderedPage {
            html: format!("render-{n}"),
            title: None,
        })
    }
}

/// Blocks every render until released.
struct GateRenderer {
    calls: AtomicU64,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Renderer for GateRenderer {
    fn render(&self, source: &[u8]) -> Result<RenderedPage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.send(()).ok();
        self.release.recv().ok();
        Ok(RenderedPage {
            html: String::from_utf8_lossy(source).into_owned(),
            title: None,
        })
    }
}

// ============================================================================
// Get / RescanOne
// ============================================================================

#[test]
fn test_heading_renders_into_cache() {
    let (_temp, cache) = markdown_cache(&[("a.md", "# Title")]);
    cache.rescan_one("a.md").unwrap();

    let page = cache.get("a.md").unwrap();
    assert!(page.html.contains("<h1>Title</h1>"));
    assert_eq!(page.revision, 1);
}

#[test]
fn test_get_missing_before_scan() {
    let (_temp, cache) = markdown_cache(&[("a.md", "# A")]);
    assert!(cache.get("missing").is_none());
    assert!(cache.get("a.md").is_none());
}

#[test]
fn test_rescan_one_bumps_revision_and_emits_once() {
    let (_temp, cache) = markdown_cache(&[("docs/x.md", "one")]);
    let updates = cache.updates().unwrap();

    assert_eq!(cache.rescan_one("docs/x.md").unwrap().revision, 1);
    write(&cache, "docs/x.md", "two");
    assert_eq!(cache.rescan_one("/docs/x.md").unwrap().revision, 2);

    let events = updates.drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].path, "docs/x.md");
    assert_eq!(events[1].revision, 2);
    assert_eq!(events[1].kind, UpdateKind::Updated);
    assert!(cache.get("docs/x.md").unwrap().html.contains("two"));
}

#[test]
fn test_rescan_one_render_failure_keeps_entry() {
    let (temp, tree) = make_tree(&[("a.md", "fine")]);
    let cache = PageCache::new(tree, Arc::new(CountingRenderer::default()), 16);
    let updates = cache.updates().unwrap();
    cache.rescan_one("a.md").unwrap();

    fs::write(temp.path().join("a.md"), "BROKEN").unwrap();
    let err = cache.rescan_one("a.md").unwrap_err();

    assert!(matches!(err, CacheError::Render { .. }));
    let page = cache.get("a.md").unwrap();
    assert_eq!(page.html, "render-1");
    assert_eq!(page.revision, 1);
    assert_eq!(updates.drain().len(), 1);
}

#[test]
fn test_rescan_one_missing_source() {
    let (_temp, cache) = markdown_cache(&[]);
    assert!(matches!(
        cache.rescan_one("nope.md"),
        Err(CacheError::Source { .. })
    ));
    assert!(matches!(
        cache.rescan_one("../escape.md"),
        Err(CacheError::NotFound(_))
    ));
}

// ============================================================================
// Single-flight
// ============================================================================

#[test]
fn test_concurrent_rescan_one_renders_once() {
    let (entered_tx, entered_rx) = channel::unbounded();
    let (release_tx, release_rx) = channel::unbounded();
    let renderer = Arc::new(GateRenderer {
        calls: AtomicU64::new(0),
        entered: entered_tx,
        release: release_rx,
    });
    let (_temp, tree) = make_tree(&[("a.md", "content")]);
    let cache = Arc::new(PageCache::new(tree, renderer.clone(), 16));
    let updates = cache.updates().unwrap();

    let first = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.rescan_one("a.md"))
    };
    entered_rx.recv().unwrap();

    let second = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.rescan_one("a.md"))
    };
    while cache.render_waiters("a.md") == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    release_tx.send(()).unwrap();

    let a = first.join().unwrap().unwrap();
    let b = second.join().unwrap().unwrap();
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.revision, 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(updates.drain().len(), 1);
}

#[test]
fn test_concurrent_rescans_never_tear_reads() {
    let renderer = Arc::new(CountingRenderer::default());
    let (_temp, tree) = make_tree(&[("a.md", "content")]);
    let cache = Arc::new(PageCache::new(tree, renderer.clone(), 1024));
    let updates = cache.updates().unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..100 {
                    cache.rescan_one("a.md").unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let (cache, stop) = (Arc::clone(&cache), Arc::clone(&stop));
        thread::spawn(move || {
            let mut last = 0;
            while !stop.load(Ordering::SeqCst) {
                if let Some(page) = cache.get("a.md") {
                    assert_eq!(page.html, format!("render-{}", page.revision));
                    assert!(page.revision >= last, "revision went backwards");
                    last = page.revision;
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    let renders = renderer.calls.load(Ordering::SeqCst);
    assert_eq!(updates.drain().len() as u64, renders);
    assert_eq!(cache.get("a.md").unwrap().revision, renders);
}

// ============================================================================
// RescanAll
// ============================================================================

#[test]
fn test_rescan_all_populates_and_indexes() {
    let (_temp, cache) = markdown_cache(&[
        ("README.md", "# Home"),
        ("docs/guide.md", "# Guide\n\ntext"),
        ("docs/plain.md", "no heading"),
        ("notes.txt", "ignored"),
    ]);

    let report = cache.rescan_all().unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.rendered, 3);

    let index = cache.index();
    let paths: Vec<_> = index.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "docs/guide.md", "docs/plain.md"]);
    assert_eq!(index[1].title, "Guide");
    assert_eq!(index[2].title, "docs/plain.md");

    for entry in &index {
        let page = cache.get(&entry.path).expect("index entry must be gettable");
        assert_eq!(page.revision, entry.revision);
    }
}

#[test]
fn test_rescan_all_twice_is_idempotent() {
    let renderer = Arc::new(CountingRenderer::default());
    let (_temp, tree) = make_tree(&[("a.md", "a"), ("b.md", "b")]);
    let cache = PageCache::new(tree, renderer.clone(), 16);
    let updates = cache.updates().unwrap();

    cache.rescan_all().unwrap();
    assert_eq!(updates.drain().len(), 2);

    let report = cache.rescan_all().unwrap();
    assert_eq!(report.rendered, 0);
    assert_eq!(report.unchanged, 2);
    assert!(updates.drain().is_empty());
    assert_eq!(cache.get("a.md").unwrap().revision, 1);
}

#[test]
fn test_rescan_all_emits_only_for_changed_pages() {
    let (_temp, cache) = markdown_cache(&[("a.md", "a"), ("b.md", "b")]);
    let updates = cache.updates().unwrap();
    cache.rescan_all().unwrap();
    updates.drain();

    write(&cache, "b.md", "b2");
    cache.rescan_all().unwrap();

    let events = updates.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].path, "b.md");
    assert_eq!(events[0].revision, 2);
    assert_eq!(cache.get("a.md").unwrap().revision, 1);
}

#[test]
fn test_rescan_all_isolates_render_failures() {
    let (temp, tree) = make_tree(&[("good.md", "ok"), ("bad.md", "fine at first")]);
    let cache = PageCache::new(tree, Arc::new(CountingRenderer::default()), 16);
    cache.rescan_all().unwrap();

    fs::write(temp.path().join("bad.md"), "BROKEN").unwrap();
    fs::write(temp.path().join("new-bad.md"), "BROKEN").unwrap();
    fs::write(temp.path().join("good.md"), "ok again").unwrap();
    let report = cache.rescan_all().unwrap();

    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(CacheError::is_page_local));
    assert_eq!(cache.get("good.md").unwrap().revision, 2);
    // Old entry retained, new broken file omitted.
    assert_eq!(cache.get("bad.md").unwrap().revision, 1);
    assert!(cache.get("new-bad.md").is_none());
}

#[test]
fn test_rescan_all_unreadable_root_keeps_snapshot() {
    let (temp, cache) = markdown_cache(&[("a.md", "# A")]);
    cache.rescan_all().unwrap();

    let root = cache.tree().root().to_path_buf();
    drop(temp);
    assert!(!root.exists());

    let err = cache.rescan_all().unwrap_err();
    assert!(matches!(err, CacheError::Scan { .. }));
    assert!(cache.get("a.md").is_some());
}

#[test]
fn test_rescan_all_drops_deleted_sources_and_keeps_max_revision() {
    let (_temp, cache) = markdown_cache(&[("a.md", "1"), ("b.md", "b")]);
    cache.rescan_all().unwrap();
    write(&cache, "a.md", "2");
    cache.rescan_one("a.md").unwrap();
    fs::remove_file(cache.tree().root().join("b.md")).unwrap();

    let report = cache.rescan_all().unwrap();
    assert_eq!(report.removed, 1);
    assert!(cache.get("b.md").is_none());
    assert_eq!(cache.get("a.md").unwrap().revision, 2);
}

// ============================================================================
// Evict
// ============================================================================

#[test]
fn test_evict_emits_removed_and_revision_keeps_growing() {
    let (_temp, cache) = markdown_cache(&[("a.md", "a")]);
    let updates = cache.updates().unwrap();
    cache.rescan_one("a.md").unwrap();

    assert_eq!(cache.evict("a.md"), Some(2));
    assert!(cache.get("a.md").is_none());
    assert_eq!(cache.evict("a.md"), None);

    assert_eq!(cache.rescan_one("a.md").unwrap().revision, 3);

    let kinds: Vec<_> = updates.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![UpdateKind::Updated, UpdateKind::Removed, UpdateKind::Updated]
    );
}

#[test]
fn test_close_ends_update_stream() {
    let (_temp, cache) = markdown_cache(&[("a.md", "a")]);
    let updates = cache.updates().unwrap();
    assert!(cache.updates().is_none());

    cache.close();
    cache.rescan_one("a.md").unwrap();
    assert_eq!(updates.recv(), Err(ChannelClosed));
}

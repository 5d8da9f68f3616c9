use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use rustc_hash::FxHashMap;

pub(super) const DEBOUNCE_MS: u64 = 300;
pub(super) const RESCAN_COOLDOWN_MS: u64 = 800;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub(super) fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }

    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Remove(_) => Some(Self::Removed),
            // Editors that save via rename produce From/To pairs.
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Self::Removed),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Self::Created),
            // Metadata-only changes (mtime/chmod) would re-render for nothing.
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(Self::Modified),
            _ => None,
        }
    }
}

/// Timing and per-path deduplication of raw notify events.
pub(super) struct Debouncer {
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
    last_flush: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_flush: None,
        }
    }

    /// Add a notify event, merging with what is already pending:
    /// - Removed then Created/Modified: the file existed before the batch and
    ///   came back, Modified (a later Removed turns it back into Removed)
    /// - Modified then Removed: Removed
    /// - Created then Removed: appeared and vanished inside the batch, drop
    /// - anything else: first event wins
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        let Some(kind) = ChangeKind::from_event(&event.kind) else {
            return;
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }

            match self.changes.get(path).copied() {
                None => {
                    crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
                    self.changes.insert(path.clone(), kind);
                }
                Some(existing) => match (existing, kind) {
                    (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                        self.changes.insert(path.clone(), ChangeKind::Modified);
                    }
                    (ChangeKind::Modified, ChangeKind::Removed) => {
                        self.changes.insert(path.clone(), ChangeKind::Removed);
                    }
                    (ChangeKind::Created, ChangeKind::Removed) => {
                        self.changes.remove(path);
                    }
                    _ => {}
                },
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take pending changes once the debounce window and cooldown have passed.
    pub(super) fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if !self.is_ready() {
            return None;
        }

        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;
        self.last_flush = Some(Instant::now());
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }

        if let Some(last_flush) = self.last_flush
            && last_flush.elapsed() < Duration::from_millis(RESCAN_COOLDOWN_MS)
        {
            return false;
        }

        !self.changes.is_empty()
    }

    /// Time until the pending batch could become ready, capped at `max`.
    pub(super) fn sleep_duration(&self, max: Duration) -> Duration {
        let Some(last_event) = self.last_event else {
            return max;
        };
        // Everything pending cancelled out.
        if self.changes.is_empty() {
            return max;
        }

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_flush
            .map(|t| Duration::from_millis(RESCAN_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .clamp(Duration::from_millis(1), max)
    }
}

/// Check if path is a temp/backup file (editor artifacts).
pub(super) fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

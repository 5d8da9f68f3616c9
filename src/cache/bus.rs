//! Update bus: change events from the page cache to its single consumer.
//!
//! ```text
//! PageCache --publish--> [bounded buffer] --recv--> SubscriptionHub
//! ```
//!
//! Publishing never blocks. When the buffer is full the new event is dropped,
//! so a stalled consumer cannot stall rendering.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// What happened to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Re-rendered (or rendered for the first time).
    Updated,
    /// Source disappeared, entry evicted.
    Removed,
}

/// One committed change to one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub path: String,
    pub revision: u64,
    pub kind: UpdateKind,
    /// Commit time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl UpdateEvent {
    pub fn new(path: impl Into<String>, revision: u64, kind: UpdateKind) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            path: path.into(),
            revision,
            kind,
            timestamp,
        }
    }
}

/// The update source was closed (process shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("update channel closed")]
pub struct ChannelClosed;

/// Producer side, owned by the cache.
pub struct UpdateBus {
    tx: Mutex<Option<Sender<UpdateEvent>>>,
    /// Handed out once by [`UpdateBus::subscribe`].
    rx: Mutex<Option<Receiver<UpdateEvent>>>,
}

impl UpdateBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Publish without blocking. Returns `false` if the event was dropped.
    pub fn publish(&self, event: UpdateEvent) -> bool {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                crate::debug!("cache"; "update buffer full, dropped event for {}", event.path);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Take the consumer handle. Only the first call gets one.
    pub fn subscribe(&self) -> Option<UpdateSource> {
        self.rx.lock().take().map(|rx| UpdateSource { rx })
    }

    /// Close the bus. The consumer drains what is buffered, then sees
    /// [`ChannelClosed`].
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Consumer side: a lazy, unbounded sequence of [`UpdateEvent`]s.
pub struct UpdateSource {
    rx: Receiver<UpdateEvent>,
}

impl UpdateSource {
    /// Block until the next event or until the bus closes.
    pub fn recv(&self) -> Result<UpdateEvent, ChannelClosed> {
        self.rx.recv().map_err(|_| ChannelClosed)
    }

    /// Like [`recv`](Self::recv), giving up after `timeout` with `Ok(None)`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<UpdateEvent>, ChannelClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelClosed),
        }
    }

    /// Events already buffered, without blocking.
    pub fn drain(&self) -> Vec<UpdateEvent> {
        self.rx.try_iter().collect()
    }
}

impl Iterator for UpdateSource {
    type Item = UpdateEvent;

    fn next(&mut self) -> Option<UpdateEvent> {
        self.recv().ok()
    }
}

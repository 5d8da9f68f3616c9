//! Live reload: per-path fan-out of page updates to websocket clients.
//!
//! # Architecture
//!
//! ```text
//! PageCache --[UpdateEvent]--> dispatch thread --[match pattern]--> Mailbox (cap 1)
//!                                                                      |
//!                          WsServer --accept--> ClientSession <--------+
//!                                                    |
//!                                                    +--[reload JSON]--> browser
//! ```
//!
//! The registry is a concurrent map guarded independently of the cache. The
//! dispatch loop snapshots the matching mailboxes before delivering, so
//! sessions may register and deregister at any time.

mod mailbox;
mod message;
mod pattern;
mod server;
mod session;


pub use mailbox::{Delivery, Disconnected, Inbox, Mailbox, mailbox};
pub use message::{PROTOCOL_VERSION, ReloadMessage};
pub use pattern::PathPattern;
pub use server::{WS_ROUTE, WsServer};
pub use session::{ClientSession, CloseReason, Lifecycle, SessionError, SessionState};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use dashmap::DashMap;

use crate::cache::{UpdateEvent, UpdateSource};

/// Registry key for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    pattern: PathPattern,
    mailbox: Mailbox,
}

#[derive(Default)]
struct Registry {
    subscribers: DashMap<SubscriberId, Subscriber>,
    next_id: AtomicU64,
}

/// Fans out page updates to the sessions watching matching paths.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    registry: Arc<Registry>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `pattern`.
    ///
    /// The subscriber sees every event dispatched from now until the returned
    /// [`Subscription`] is dropped.
    pub fn register(&self, pattern: PathPattern) -> Subscription {
        let id = SubscriberId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (mailbox, inbox) = mailbox();
        crate::debug!("ws"; "subscribe #{} to {}", id.0, pattern);
        self.registry
            .subscribers
            .insert(id, Subscriber { pattern, mailbox });
        Subscription {
            id,
            inbox,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Remove a subscriber. Safe to call repeatedly and concurrently with dispatch.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        self.registry.deregister(id)
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.registry.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.subscribers.is_empty()
    }

    /// Deliver one event to every matching subscriber. Returns how many got it.
    ///
    /// Never blocks on a subscriber. Subscribers whose session is gone are
    /// removed on the way.
    pub fn dispatch(&self, event: &UpdateEvent) -> usize {
        let targets: Vec<SubscriberId> = self
            .registry
            .subscribers
            .iter()
            .filter(|entry| entry.pattern.matches(&event.path))
            .map(|entry| *entry.key())
            .collect();

        let mut delivered = 0;
        for id in targets {
            let delivery = match self.registry.subscribers.get(&id) {
                Some(subscriber) => subscriber.mailbox.offer(event.clone()),
                // Deregistered since the snapshot.
                None => continue,
            };
            match delivery {
                Delivery::Queued | Delivery::Coalesced => delivered += 1,
                Delivery::Closed => {
                    self.registry.deregister(id);
                }
            }
        }

        crate::debug!("ws"; "{} r{} -> {} subscriber(s)", event.path, event.revision, delivered);
        delivered
    }

    /// Start the dispatch loop on its own thread.
    ///
    /// The loop runs until `source` reports the channel closed, then drops
    /// every mailbox so all sessions wind down.
    pub fn spawn_dispatch(&self, source: UpdateSource) -> std::io::Result<JoinHandle<()>> {
        let hub = self.clone();
        thread::Builder::new()
            .name("reload-dispatch".into())
            .spawn(move || hub.run_dispatch(source))
    }

    fn run_dispatch(&self, source: UpdateSource) {
        loop {
            match source.recv() {
                Ok(event) => {
                    self.dispatch(&event);
                }
                Err(closed) => {
                    crate::debug!("ws"; "dispatch loop exiting: {}", closed);
                    break;
                }
            }
        }
        self.close_all();
    }

    /// Drop every subscriber; their sessions see the mailbox disconnect.
    pub fn close_all(&self) {
        self.registry.subscribers.clear();
    }
}

impl Registry {
    fn deregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            crate::debug!("ws"; "unsubscribe #{} (remaining: {})", id.0, self.subscribers.len());
        }
        removed
    }
}

/// A live registration. Dropping it deregisters exactly once.
pub struct Subscription {
    id: SubscriberId,
    inbox: Inbox,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

//! Per-subscriber outbound queue.
//!
//! Capacity one, newest wins: an event arriving while another is still queued
//! replaces it. Events are "something changed, reload" signals, so only the
//! latest one matters and the dispatcher never blocks on a slow client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::cache::UpdateEvent;

/// Result of [`Mailbox::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued into an empty slot.
    Queued,
    /// Replaced an event the session had not picked up yet.
    Coalesced,
    /// The session is gone.
    Closed,
}

/// Hub side of a subscriber queue.
pub struct Mailbox {
    tx: Sender<UpdateEvent>,
    /// Used only to evict the queued event when the slot is full.
    evict: Receiver<UpdateEvent>,
    open: Arc<AtomicBool>,
}

/// Session side of a subscriber queue.
pub struct Inbox {
    rx: Receiver<UpdateEvent>,
    open: Arc<AtomicBool>,
}

/// The hub dropped the mailbox (deregistered or shut down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

pub fn mailbox() -> (Mailbox, Inbox) {
    let (tx, rx) = channel::bounded(1);
    let open = Arc::new(AtomicBool::new(true));
    (
        Mailbox {
            tx,
            evict: rx.clone(),
            open: Arc::clone(&open),
        },
        Inbox { rx, open },
    )
}

impl Mailbox {
    /// Non-blocking, replace-on-full delivery.
    pub fn offer(&self, event: UpdateEvent) -> Delivery {
        if !self.open.load(Ordering::Acquire) {
            return Delivery::Closed;
        }

        let mut event = event;
        let mut coalesced = false;
        loop {
            match self.tx.try_send(event) {
                Ok(()) if coalesced => return Delivery::Coalesced,
                Ok(()) => return Delivery::Queued,
                Err(TrySendError::Full(back)) => {
                    // Races with the session taking it, either way the slot frees up.
                    coalesced |= self.evict.try_recv().is_ok();
                    event = back;
                }
                Err(TrySendError::Disconnected(_)) => return Delivery::Closed,
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Inbox {
    /// Wait up to `timeout` for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<UpdateEvent>, Disconnected> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Disconnected),
        }
    }

    /// Take the queued event, if any.
    pub fn try_recv(&self) -> Result<Option<UpdateEvent>, Disconnected> {
        self.recv_timeout(Duration::ZERO)
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

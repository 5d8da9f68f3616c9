//! Shutdown coordination for serve mode.
//!
//! One [`Shutdown`] handle is created per server and cloned into every
//! long-lived thread. Triggering it runs the registered hooks once (unblock
//! the HTTP server, close the update bus) and flips the flag that session,
//! acceptor and watcher loops poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
    hooks: Arc<Mutex<Vec<Hook>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested
    ///
    /// Relaxed ordering: worst case a loop runs one more iteration.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }

    /// Run `hook` on shutdown. Runs immediately if shutdown already happened.
    ///
    /// The flag is read under the hooks lock: a `trigger` that flips it after
    /// this check still has to take the lock, so it sees the pushed hook.
    pub fn on_trigger(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.hooks.lock();
        if self.triggered.load(Ordering::SeqCst) {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }

    /// Request shutdown. Only the first call runs the hooks.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
        true
    }

    /// Trigger this handle on Ctrl+C. Call once per process.
    pub fn install_ctrlc(&self) -> anyhow::Result<()> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            if shutdown.trigger() {
                crate::log!("serve"; "shutting down...");
            } else {
                // Second Ctrl+C: stop waiting for a graceful exit.
                std::process::exit(130);
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
    }
}

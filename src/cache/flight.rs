//! Single-flight call coalescing.
//!
//! At most one call per key executes at a time. Callers that arrive while a
//! call is running block until it finishes and receive a clone of its result.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

/// An in-flight call.
struct Call<T> {
    /// `None` while running; `Some(None)` if the leader unwound.
    outcome: Mutex<Option<Option<T>>>,
    done: Condvar,
    waiters: AtomicUsize,
}

impl<T> Call<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    fn finish(&self, result: Option<T>) {
        *self.outcome.lock() = Some(result);
        self.done.notify_all();
    }
}

/// Keyed single-flight group.
pub struct SingleFlight<K, T> {
    calls: Mutex<FxHashMap<K, Arc<Call<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the call already running for it.
    ///
    /// If the running call panics, joined callers retry with their own
    /// `work` instead of hanging.
    pub fn run<F>(&self, key: &K, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let (call, leader) = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => {
                    call.waiters.fetch_add(1, Ordering::SeqCst);
                    (Arc::clone(call), false)
                }
                None => {
                    let call = Arc::new(Call::new());
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if !leader {
            let mut outcome = call.outcome.lock();
            while outcome.is_none() {
                call.done.wait(&mut outcome);
            }
            let shared = (*outcome).clone().flatten();
            drop(outcome);
            return match shared {
                Some(result) => result,
                None => self.run(key, work),
            };
        }

        let mut guard = LeaderGuard {
            group: self,
            key,
            call: &call,
            result: None,
        };
        let result = work();
        guard.result = Some(result.clone());
        drop(guard);
        result
    }

    /// Number of callers currently blocked on `key`.
    pub fn waiters(&self, key: &K) -> usize {
        self.calls
            .lock()
            .get(key)
            .map_or(0, |call| call.waiters.load(Ordering::SeqCst))
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Unregisters the call and wakes waiters, also when `work` unwinds.
struct LeaderGuard<'a, K: Eq + Hash, T> {
    group: &'a SingleFlight<K, T>,
    key: &'a K,
    call: &'a Arc<Call<T>>,
    result: Option<T>,
}

impl<K: Eq + Hash, T> Drop for LeaderGuard<'_, K, T> {
    fn drop(&mut self) {
        self.group.calls.lock().remove(self.key);
        self.call.finish(self.result.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    fn wait_for_waiters(group: &SingleFlight<String, u32>, key: &String, n: usize) {
        for _ in 0..500 {
            if group.waiters(key) >= n {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("waiters never joined");
    }

    #[test]
    fn test_concurrent_calls_share_one_execution() {
        let group = Arc::new(SingleFlight::<String, u32>::new());
        let runs = Arc::new(AtomicU32::new(0));
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (release_tx, release_rx) = channel::bounded::<()>(1);
        let key = "a".to_string();

        let leader = {
            let (group, runs, key) = (Arc::clone(&group), Arc::clone(&runs), key.clone());
            thread::spawn(move || {
                group.run(&key, || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    runs.fetch_add(1, Ordering::SeqCst) + 1
                })
            })
        };
        entered_rx.recv().unwrap();

        let follower = {
            let (group, runs, key) = (Arc::clone(&group), Arc::clone(&runs), key.clone());
            thread::spawn(move || group.run(&key, || runs.fetch_add(1, Ordering::SeqCst) + 100))
        };
        wait_for_waiters(&group, &key, 1);
        release_tx.send(()).unwrap();

        assert_eq!(leader.join().unwrap(), 1);
        assert_eq!(follower.join().unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn test_sequential_calls_run_again() {
        let group = SingleFlight::<String, u32>::new();
        let key = "a".to_string();
        assert_eq!(group.run(&key, || 1), 1);
        assert_eq!(group.run(&key, || 2), 2);
    }

    #[test]
    fn test_distinct_keys_do_not_block_each_other() {
        let group = SingleFlight::<String, u32>::new();
        let outer = group.run(&"a".to_string(), || group.run(&"b".to_string(), || 7));
        assert_eq!(outer, 7);
    }

    #[test]
    fn test_leader_panic_releases_waiters() {
        let group = Arc::new(SingleFlight::<String, u32>::new());
        let (entered_tx, entered_rx) = channel::bounded::<()>(1);
        let (release_tx, release_rx) = channel::bounded::<()>(1);
        let key = "a".to_string();

        let leader = {
            let (group, key) = (Arc::clone(&group), key.clone());
            thread::spawn(move || {
                group.run(&key, || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    panic!("render blew up");
                })
            })
        };
        entered_rx.recv().unwrap();

        let follower = {
            let (group, key) = (Arc::clone(&group), key.clone());
            thread::spawn(move || group.run(&key, || 42))
        };
        wait_for_waiters(&group, &key, 1);
        release_tx.send(()).unwrap();

        assert!(leader.join().is_err());
        assert_eq!(follower.join().unwrap(), 42);
    }
}

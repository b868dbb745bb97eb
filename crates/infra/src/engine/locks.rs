//! Per-item mutual exclusion with a bounded wait.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use loomledger_core::ItemId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("timed out after {waited:?} waiting for item lock on {items}")]
pub struct LockTimeout {
    pub items: String,
    pub waited: Duration,
}

/// Set of item ids currently being mutated.
///
/// Operations on the same item serialize; operations on different items
/// proceed in parallel. Multi-item operations take all their ids in one
/// step, so two transfers in opposite directions cannot deadlock.
#[derive(Debug)]
pub struct ItemLocks {
    held: Mutex<HashSet<ItemId>>,
    released: Condvar,
    timeout: Duration,
}

impl ItemLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Wait until every id in `ids` is free, then hold them all.
    pub fn acquire(&self, ids: &[&ItemId]) -> Result<ItemGuard<'_>, LockTimeout> {
        let mut wanted: Vec<ItemId> = ids.iter().map(|id| (*id).clone()).collect();
        wanted.sort();
        wanted.dedup();

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if wanted.iter().all(|id| !held.contains(id)) {
                held.extend(wanted.iter().cloned());
                return Ok(ItemGuard {
                    locks: self,
                    ids: wanted,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockTimeout {
                    items: wanted
                        .iter()
                        .map(ItemId::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    waited: now - started,
                });
            }

            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
    }
}

/// Releases its ids on drop.
#[derive(Debug)]
pub struct ItemGuard<'a> {
    locks: &'a ItemLocks,
    ids: Vec<ItemId>,
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(s: &str) -> ItemId {
        ItemId::new(s).unwrap()
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let locks = ItemLocks::new(Duration::from_millis(20));
        let a = id("A");
        let _guard = locks.acquire(&[&a]).unwrap();

        let err = locks.acquire(&[&a]).unwrap_err();
        assert_eq!(err.items, "A");
    }

    #[test]
    fn different_items_do_not_block_each_other() {
        let locks = ItemLocks::new(Duration::from_millis(20));
        let (a, b) = (id("A"), id("B"));
        let _ga = locks.acquire(&[&a]).unwrap();
        assert!(locks.acquire(&[&b]).is_ok());
    }

    #[test]
    fn release_wakes_waiters() {
        let locks = Arc::new(ItemLocks::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                std::thread::spawn(move || {
                    let a = id("A");
                    let _g = locks.acquire(&[&a]).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_ids_in_one_request_are_fine() {
        let locks = ItemLocks::new(Duration::from_millis(20));
        let a = id("A");
        assert!(locks.acquire(&[&a, &a]).is_ok());
    }
}

//! Bounded concurrency slots

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Bounded pool of concurrency slots.
///
/// At most `max` slots are outstanding at any instant, no matter how many
/// callers are waiting. `acquire` suspends until a slot frees up; the slot
/// is given back when the returned [`Slot`] drops, so every exit path of a
/// task, including panics and cancellation, releases its slot.
///
/// The pool counts total acquires and releases so a finished run can check
/// that no slot leaked.
#[derive(Debug)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    max: usize,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl SlotPool {
    /// Create a pool with `max` slots
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot and take it.
    ///
    /// No fairness is promised between waiting callers, but no caller waits
    /// forever while slots keep being returned.
    pub async fn acquire(&self) -> Slot {
        // The semaphore is never closed, so acquire_owned cannot fail here
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("slot semaphore closed");
        self.acquired.fetch_add(1, Ordering::SeqCst);
        trace!(in_flight = self.in_flight(), max = self.max, "slot acquired");
        Slot {
            _permit: permit,
            released: Arc::clone(&self.released),
        }
    }

    /// Configured maximum number of simultaneous slots
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    /// Total slots handed out since creation
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Total slots given back since creation
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// True when every acquired slot has been released
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.acquired() == self.released()
    }
}

/// One held concurrency slot.
///
/// Dropping the slot releases it. There is no explicit release call, which
/// makes double release unrepresentable.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    released: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn holds_at_most_max_slots() {
        let pool = Arc::new(SlotPool::new(2));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _slot = pool.acquire().await;
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.acquired(), 8);
        assert_eq!(pool.released(), 8);
        assert!(pool.is_balanced());
    }

    #[tokio::test]
    async fn drop_releases_the_slot() {
        let pool = SlotPool::new(1);
        let slot = pool.acquire().await;
        assert_eq!(pool.in_flight(), 1);
        drop(slot);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.is_balanced());
    }

    #[tokio::test]
    async fn waiter_proceeds_once_a_slot_frees() {
        let pool = Arc::new(SlotPool::new(1));
        let held = pool.acquire().await;

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let _slot = pool.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish after release")
            .unwrap();
        assert!(pool.is_balanced());
    }

    #[tokio::test]
    async fn panic_in_holder_still_releases() {
        let pool = Arc::new(SlotPool::new(1));
        let task = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let _slot = pool.acquire().await;
                panic!("holder died");
            })
        };
        assert!(task.await.is_err());
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.is_balanced());
    }
}

//! Per-user FIFO timed lock (`spec.md` §5). Re-architected from the
//! teacher's momentary `HashMap` lock (`amas`'s per-user state map, locked
//! only long enough to clone out a model bundle) into an explicit fair
//! waiter queue with a timeout watchdog, per `SPEC_FULL.md` §4.5 — this is
//! "the key fix relative to the observed defect": the teacher's pattern does
//! not stop the sweeper and an in-flight `process_event` from interleaving
//! ridge updates on the same user.
//!
//! Modeled as the FSM `Idle -> Queued -> Running -> Done` from `spec.md` §9:
//! a fresh user id starts `Idle` (held = false); acquiring with no
//! contention transitions straight to `Running`; acquiring under
//! contention enters `Queued` until woken. The queue never holds a
//! `std::sync::Mutex` across an await point — only `parking_lot::Mutex`
//! guards a short, synchronous critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::EngineError;

struct UserQueue {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl UserQueue {
    fn new() -> Self {
        Self { held: false, waiters: VecDeque::new() }
    }

    /// Wakes the next waiter in FIFO order. A waiter whose receiver already
    /// dropped (it timed out while queued) must not be allowed to wedge the
    /// lock permanently open — a failed send simply tries the next waiter,
    /// and running out of waiters releases the lock entirely.
    fn wake_next(&mut self) {
        while let Some(tx) = self.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        self.held = false;
    }
}

pub struct UserLockTable {
    queues: Mutex<HashMap<String, UserQueue>>,
}

impl UserLockTable {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()) }
    }

    /// Acquires the lock for `user_id`, queueing FIFO behind any current
    /// holder and waiters. Returns `LockTimeout` if not granted within
    /// `wait_timeout`; on timeout the caller never mutates state, matching
    /// the "does not mutate state" contract of `spec.md` §5.
    pub async fn acquire(
        self: &Arc<Self>,
        user_id: &str,
        wait_timeout: Duration,
    ) -> Result<UserLockGuard, EngineError> {
        let pending = {
            let mut queues = self.queues.lock();
            let q = queues.entry(user_id.to_string()).or_insert_with(UserQueue::new);
            if !q.held {
                q.held = true;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                q.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = pending {
            match tokio::time::timeout(wait_timeout, rx).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    return Err(EngineError::LockTimeout {
                        user_id: user_id.to_string(),
                        waited_ms: wait_timeout.as_millis() as u64,
                    });
                }
            }
        }

        Ok(UserLockGuard { table: Arc::clone(self), user_id: user_id.to_string() })
    }
}

impl Default for UserLockTable {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UserLockGuard {
    table: Arc<UserLockTable>,
    user_id: String,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        let mut queues = self.table.queues.lock();
        if let Some(q) = queues.get_mut(&self.user_id) {
            q.wake_next();
            if !q.held && q.waiters.is_empty() {
                queues.remove(&self.user_id);
            }
        }
    }
}

//! Control/orchestration layer (`spec.md` §4.5, §5): the per-user FIFO lock,
//! the `process_event`/`apply_delayed_reward`/`explain` orchestration, the
//! reward queue's enqueue/backoff helpers, the realized-reward computation
//! the sweeper feeds from, and the sweeper itself.

pub mod engine;
pub mod lock;
pub mod reward;
pub mod reward_queue;
pub mod sweeper;

//! Generic, idempotency-aware background job queue.
//!
//! A reusable primitive for coarse-grained background tasks that do not
//! need per-recipient logging. Jobs carry an opaque type string and JSON
//! payload; claiming is race-safe through a single conditional update in
//! the backing store, and failed handlers are retried up to a per-job
//! limit.
//!
//! Intentionally decoupled from the campaign job model: campaign sends get
//! their own worker with delivery logs and a circuit breaker, while this
//! queue handles everything else (exports, cleanup, notification fan-out).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod queue;
pub mod store;

pub use queue::{JobHandler, JobQueue, RunOutcome, DEFAULT_MAX_RETRIES};
pub use store::{PostgresQueueStore, QueueStore};

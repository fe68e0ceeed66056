//! Scheduler: turns declarative automation and follow-up definitions into
//! campaign jobs.
//!
//! Invoked per sweep (external cron or a manual trigger), not as a
//! long-running loop. Each sweep evaluates due definitions independently so
//! one bad definition cannot block the rest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod store;
pub mod sweep;

pub use store::{PostgresSchedulerStore, SchedulerStore};
pub use sweep::{Scheduler, SweepReport};

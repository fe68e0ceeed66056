//! Campaign delivery worker.
//!
//! Drains one campaign job per invocation: claims it with a conditional
//! update, resolves recipients through segmentation, merges the template
//! per recipient, and sends strictly sequentially with inter-recipient rate
//! limiting and a consecutive-failure circuit breaker.
//!
//! The sequential loop is a design requirement, not an accident: both the
//! breaker and the rate limiter depend on ordered one-at-a-time execution.
//! Do not parallelize sends within a single job run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod progress;
pub mod provider;
pub mod storage;
pub mod worker;

pub use error::{DeliveryError, Result};
pub use progress::{RunPolicy, RunProgress, StepDecision};
pub use provider::{GatewaySendProvider, SendOutcome, SendProvider};
pub use storage::{DeliveryStore, PostgresDeliveryStore};
pub use worker::{DeliveryWorker, RunReport, WorkerConfig};

/// Consecutive failures that trip the circuit breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 20;

/// Counter checkpoint cadence in recipients.
pub const DEFAULT_CHECKPOINT_EVERY: u32 = 10;

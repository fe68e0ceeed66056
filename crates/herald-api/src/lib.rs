//! HTTP surface for the campaign delivery pipeline.
//!
//! Exposes the minimal trigger endpoints: `POST /scheduler` runs one
//! sweep, `POST /run-job` runs one specific campaign job, and
//! `POST /worker` claims and runs the next pending message-channel job.
//! `GET` variants return cheap status summaries without performing work.
//!
//! Execution is request-triggered: every invocation does one bounded unit
//! of work and returns. There is no in-process scheduler loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::{create_router, start_server};
pub use state::AppState;

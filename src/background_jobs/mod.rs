//! Background job scheduling and execution system.
//!
//! Runs periodic jobs (the hourly warehouse pipeline) with bounded retry and
//! stops cleanly when the shutdown token is cancelled.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule, RetryPolicy};
pub use scheduler::JobScheduler;

//! Periodic warehouse refresh.
//!
//! Creates the schema when it is missing and loads both data trees. Never
//! resets existing tables, so accumulated rows survive every run.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, RetryPolicy},
};
use crate::etl::Operation;
use crate::runner::{RunStatus, RunnerError};
use std::time::Duration;
use tracing::info;

pub struct WarehousePipelineJob {
    interval: Duration,
    retry: RetryPolicy,
}

impl WarehousePipelineJob {
    pub fn new(interval: Duration, retries: u32, retry_delay: Duration) -> Self {
        Self {
            interval,
            retry: RetryPolicy {
                retries,
                delay: retry_delay,
            },
        }
    }
}

impl BackgroundJob for WarehousePipelineJob {
    fn id(&self) -> &'static str {
        "warehouse_pipeline"
    }

    fn name(&self) -> &'static str {
        "Warehouse Pipeline"
    }

    fn description(&self) -> &'static str {
        "Ensure the warehouse schema exists, then load song and log data"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let record = ctx
            .runtime
            .block_on(ctx.runner.run_to_completion(Operation::Pipeline))
            .map_err(|e| match e {
                RunnerError::AlreadyRunning { .. } => JobError::AlreadyRunning,
                other => JobError::ExecutionFailed(other.to_string()),
            })?;

        match record.status {
            RunStatus::Succeeded => {
                if let Some(report) = record.outcome.and_then(|o| o.report) {
                    info!(
                        "Scheduled pipeline loaded {} song files and {} log files, {} songplays",
                        report.song_files, report.log_files, report.songplays
                    );
                }
                Ok(())
            }
            _ => Err(JobError::ExecutionFailed(
                record
                    .error
                    .unwrap_or_else(|| format!("run {} did not succeed", record.run_id)),
            )),
        }
    }
}

use super::context::JobContext;
use super::job::{BackgroundJob, JobError, JobSchedule};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on one scheduler sleep, so the loop stays responsive to
/// registrations between runs.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Manages background job scheduling and execution.
///
/// Jobs are run one at a time from the scheduler loop; a job's retries
/// complete before any other job is considered.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn BackgroundJob>>,

    /// Next due time per job id.
    next_runs: HashMap<&'static str, Instant>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(shutdown_token: CancellationToken, job_context: JobContext) -> Self {
        Self {
            jobs: Vec::new(),
            next_runs: HashMap::new(),
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler. Interval jobs are due immediately.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.next_runs.insert(job.id(), Instant::now());
        self.jobs.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Main scheduler loop. Returns once the shutdown token is cancelled.
    pub async fn run(&mut self) {
        info!("Starting job scheduler with {} registered jobs", self.job_count());

        loop {
            let sleep_duration = self.time_until_next_job();
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    fn time_until_next_job(&self) -> Duration {
        let now = Instant::now();
        self.next_runs
            .values()
            .map(|next| next.saturating_duration_since(now))
            .min()
            .unwrap_or(MAX_SLEEP)
            .min(MAX_SLEEP)
    }

    async fn run_due_jobs(&mut self) {
        let now = Instant::now();
        let due: Vec<Arc<dyn BackgroundJob>> = self
            .jobs
            .iter()
            .filter(|job| self.next_runs.get(job.id()).is_some_and(|next| *next <= now))
            .cloned()
            .collect();

        for job in due {
            if self.shutdown_token.is_cancelled() {
                return;
            }
            // Failures are logged; the job is simply due again after its interval.
            let _ = self.run_with_retries(&job).await;
            let JobSchedule::Interval(interval) = job.schedule();
            self.next_runs.insert(job.id(), Instant::now() + interval);
        }
    }

    /// Execute a job, retrying failed attempts per its retry policy.
    ///
    /// Returns the result of the last attempt.
    pub async fn run_with_retries(&self, job: &Arc<dyn BackgroundJob>) -> Result<(), JobError> {
        let policy = job.retry_policy();
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!("Starting job: {} (attempt {})", job.id(), attempt);
            let result = self.execute_once(job).await;

            match &result {
                Ok(()) => {
                    info!("Job {} completed successfully", job.id());
                    return result;
                }
                Err(JobError::Cancelled) => {
                    info!("Job {} was cancelled", job.id());
                    return result;
                }
                Err(e) if attempt <= policy.retries => {
                    warn!(
                        "Job {} failed (attempt {}), retrying in {:?}: {}",
                        job.id(),
                        attempt,
                        policy.delay,
                        e
                    );
                }
                Err(e) => {
                    error!("Job {} failed after {} attempts: {}", job.id(), attempt, e);
                    return result;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                _ = self.shutdown_token.cancelled() => return Err(JobError::Cancelled),
            }
        }
    }

    async fn execute_once(&self, job: &Arc<dyn BackgroundJob>) -> Result<(), JobError> {
        let job = Arc::clone(job);
        let ctx = JobContext {
            cancellation_token: self.job_context.cancellation_token.child_token(),
            ..self.job_context.clone()
        };
        match tokio::task::spawn_blocking(move || job.execute(&ctx)).await {
            Ok(result) => result,
            Err(e) => Err(JobError::ExecutionFailed(format!("Task panic: {}", e))),
        }
    }
}

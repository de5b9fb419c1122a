//! Task runner: executes pipeline operations off the async runtime and keeps
//! one status record per run.
//!
//! At most one run is active at a time. A second request while a run is
//! active is rejected rather than queued, so overlapping manual and
//! scheduled triggers can never load the same files twice concurrently.

use crate::etl::{execute, EtlSettings, Operation, OperationOutcome, Progress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Finished runs beyond this many are forgotten, oldest first.
const MAX_FINISHED_RUNS: usize = 100;

pub type RunId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Snapshot of one run.
///
/// A run that succeeded without loading anything has `status: succeeded`
/// and zero counters; only `failed` runs carry `error`.
#[derive(Clone, Debug, Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub operation: Operation,
    pub status: RunStatus,
    pub output: Vec<String>,
    pub error: Option<String>,
    pub outcome: Option<OperationOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Operation {operation} is already running (run {run_id})")]
    AlreadyRunning { run_id: RunId, operation: Operation },

    #[error("Run {0} not found")]
    NotFound(RunId),
}

#[derive(Default)]
struct RunnerState {
    runs: HashMap<RunId, RunRecord>,
    /// Run ids, oldest first.
    order: VecDeque<RunId>,
    active: Option<RunId>,
}

impl RunnerState {
    fn prune(&mut self) {
        let finished = self.order.len() - usize::from(self.active.is_some());
        let mut excess = finished.saturating_sub(MAX_FINISHED_RUNS);
        while excess > 0 {
            let Some(pos) = self.order.iter().position(|id| Some(*id) != self.active) else {
                break;
            };
            if let Some(id) = self.order.remove(pos) {
                self.runs.remove(&id);
            }
            excess -= 1;
        }
    }
}

#[derive(Clone)]
pub struct TaskRunner {
    settings: Arc<EtlSettings>,
    state: Arc<Mutex<RunnerState>>,
}

impl TaskRunner {
    pub fn new(settings: EtlSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(RunnerState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start `operation` in the background and return its run id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, operation: Operation) -> Result<RunId, RunnerError> {
        self.spawn_run(operation).map(|(run_id, _)| run_id)
    }

    /// Start `operation` and wait for it to finish.
    pub async fn run_to_completion(&self, operation: Operation) -> Result<RunRecord, RunnerError> {
        let (run_id, driver) = self.spawn_run(operation)?;
        if let Err(e) = driver.await {
            error!("Run {} driver task failed: {}", run_id, e);
        }
        self.status(run_id).ok_or(RunnerError::NotFound(run_id))
    }

    pub fn status(&self, run_id: RunId) -> Option<RunRecord> {
        self.state().runs.get(&run_id).cloned()
    }

    /// All known runs, newest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let state = self.state();
        state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.runs.get(id).cloned())
            .collect()
    }

    pub fn active(&self) -> Option<RunRecord> {
        let state = self.state();
        state.active.and_then(|id| state.runs.get(&id).cloned())
    }

    fn spawn_run(&self, operation: Operation) -> Result<(RunId, JoinHandle<()>), RunnerError> {
        let run_id = {
            let mut state = self.state();
            if let Some(active) = state.active {
                let operation = state
                    .runs
                    .get(&active)
                    .map(|r| r.operation)
                    .unwrap_or(operation);
                return Err(RunnerError::AlreadyRunning {
                    run_id: active,
                    operation,
                });
            }

            let run_id = Uuid::new_v4();
            state.runs.insert(
                run_id,
                RunRecord {
                    run_id,
                    operation,
                    status: RunStatus::Running,
                    output: Vec::new(),
                    error: None,
                    outcome: None,
                    started_at: Utc::now(),
                    finished_at: None,
                },
            );
            state.order.push_back(run_id);
            state.active = Some(run_id);
            state.prune();
            run_id
        };
        info!("Run {} started: {}", run_id, operation);

        let (tx, mut rx) = unbounded_channel::<String>();
        let settings = self.settings.clone();
        let work = tokio::task::spawn_blocking(move || {
            execute(operation, &settings, &Progress::forwarding(tx))
        });

        let state = self.state.clone();
        let driver = tokio::spawn(async move {
            // The channel closes once the blocking work drops its progress sink.
            while let Some(line) = rx.recv().await {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(record) = state.runs.get_mut(&run_id) {
                    record.output.push(line);
                }
            }

            let result = work.await;
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = state.runs.get_mut(&run_id) {
                record.finished_at = Some(Utc::now());
                match result {
                    Ok(Ok(outcome)) => {
                        info!("Run {} ({}) succeeded", run_id, operation);
                        record.status = RunStatus::Succeeded;
                        record.outcome = Some(outcome);
                    }
                    Ok(Err(e)) => {
                        error!("Run {} ({}) failed: {}", run_id, operation, e);
                        record.status = RunStatus::Failed;
                        record.error = Some(e.to_string());
                    }
                    Err(e) => {
                        error!("Run {} ({}) panicked: {}", run_id, operation, e);
                        record.status = RunStatus::Failed;
                        record.error = Some(format!("Run task failed: {}", e));
                    }
                }
            }
            if state.active == Some(run_id) {
                state.active = None;
            }
        });

        Ok((run_id, driver))
    }
}

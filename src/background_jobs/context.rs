use crate::runner::TaskRunner;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains the task runner jobs submit their work to and a cancellation
/// token for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Runner shared with the HTTP server, so scheduled and manual runs never overlap.
    pub runner: TaskRunner,

    /// Runtime the scheduler lives on; jobs run on blocking threads and use
    /// it to wait for async work.
    pub runtime: Handle,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, runner: TaskRunner, runtime: Handle) -> Self {
        Self {
            cancellation_token,
            runner,
            runtime,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

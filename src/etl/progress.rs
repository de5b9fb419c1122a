use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Sink for human-readable progress lines.
///
/// Every line is logged; when a sender is attached (task runner) it is also
/// forwarded so the run's captured output can be polled while it executes.
#[derive(Clone, Default)]
pub struct Progress {
    sender: Option<UnboundedSender<String>>,
}

impl Progress {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn forwarding(sender: UnboundedSender<String>) -> Self {
        Progress {
            sender: Some(sender),
        }
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        if let Some(sender) = &self.sender {
            // The receiving run record may already be gone; output is best effort.
            let _ = sender.send(message);
        }
    }
}

//! Progress notifications while a tool runs.
//!
//! Notifications are best effort: they go to the client out of band and never
//! reach the scratchpad.

use async_trait::async_trait;
use gateway_config::ProgressStep;
use gateway_core::SessionId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Receiver of progress messages
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    /// Deliver one message for a session
    async fn notify(&self, session_id: &SessionId, message: &str);
}

/// Notifier that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl ProgressNotifier for NoOpNotifier {
    async fn notify(&self, _session_id: &SessionId, _message: &str) {}
}

/// A running progress schedule; aborted on drop
#[derive(Debug)]
pub struct ProgressTask {
    handle: Option<JoinHandle<()>>,
}

impl ProgressTask {
    /// Send each step's message after its delay (delays are cumulative)
    #[must_use]
    pub fn spawn(
        notifier: Arc<dyn ProgressNotifier>,
        session_id: SessionId,
        schedule: Vec<ProgressStep>,
    ) -> Self {
        if schedule.is_empty() {
            return Self { handle: None };
        }

        let handle = tokio::spawn(async move {
            for step in schedule {
                if !step.delay.is_zero() {
                    tokio::time::sleep(step.delay).await;
                }
                trace!(session_id = %session_id, "Progress notification");
                notifier.notify(&session_id, &step.message).await;
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Stop sending further messages
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ProgressTask {
    fn drop(&mut self) {
        self.stop();
    }
}

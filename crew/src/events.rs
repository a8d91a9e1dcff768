//! Pipeline events for real-time visibility
//!
//! The runner emits these as tasks move through their lifecycle. They can be
//! consumed by CLI output, tests, or any other subscriber.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::task::ExecutionMode;

// ============================================================================
// Pipeline Events
// ============================================================================

/// Events emitted by the pipeline runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A task was handed to a worker
    TaskDispatched {
        task_index: usize,
        role: String,
        mode: ExecutionMode,
    },

    /// A task produced an answer and is waiting for confirmation
    AwaitingConfirmation {
        task_index: usize,
        request_id: String,
    },

    /// Feedback sent the task back to its agent
    TaskRevised {
        task_index: usize,
        revision: usize,
        feedback: String,
    },

    /// A task's output file was written
    ArtifactWritten { task_index: usize, path: PathBuf },

    /// A task completed
    TaskCompleted {
        task_index: usize,
        role: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },

    /// A task failed; the run is aborting
    TaskFailed { task_index: usize, error: String },

    /// Every task reached a terminal state
    PipelineCompleted {
        tasks: usize,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Event Channel
// ============================================================================

/// Sender for pipeline events
pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver for pipeline events
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a new event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Helper for sending events; a no-op when nobody subscribed
#[derive(Clone, Default)]
pub struct PipelineEventSender {
    sender: Option<EventSender>,
}

impl PipelineEventSender {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    /// Send an event (silently dropped if no sender or receiver dropped)
    pub fn send(&self, event: PipelineEvent) {
        if let Some(ref sender) = self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn task_dispatched(&self, task_index: usize, role: &str, mode: ExecutionMode) {
        self.send(PipelineEvent::TaskDispatched {
            task_index,
            role: role.to_string(),
            mode,
        });
    }

    pub fn awaiting_confirmation(&self, task_index: usize, request_id: &str) {
        self.send(PipelineEvent::AwaitingConfirmation {
            task_index,
            request_id: request_id.to_string(),
        });
    }

    pub fn task_revised(&self, task_index: usize, revision: usize, feedback: &str) {
        self.send(PipelineEvent::TaskRevised {
            task_index,
            revision,
            feedback: feedback.to_string(),
        });
    }

    pub fn artifact_written(&self, task_index: usize, path: &std::path::Path) {
        self.send(PipelineEvent::ArtifactWritten {
            task_index,
            path: path.to_path_buf(),
        });
    }

    pub fn task_completed(&self, task_index: usize, role: &str, duration: Duration) {
        self.send(PipelineEvent::TaskCompleted {
            task_index,
            role: role.to_string(),
            duration,
        });
    }

    pub fn task_failed(&self, task_index: usize, error: &str) {
        self.send(PipelineEvent::TaskFailed {
            task_index,
            error: error.to_string(),
        });
    }

    pub fn pipeline_completed(&self, tasks: usize, duration: Duration) {
        self.send(PipelineEvent::PipelineCompleted { tasks, duration });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel() {
        let (tx, mut rx) = event_channel();
        let sender = PipelineEventSender::new(tx);

        sender.task_dispatched(0, "Venue Coordinator", ExecutionMode::Synchronous);

        match rx.recv().await.unwrap() {
            PipelineEvent::TaskDispatched { task_index, role, .. } => {
                assert_eq!(task_index, 0);
                assert_eq!(role, "Venue Coordinator");
            }
            other => panic!("Expected TaskDispatched, got {other:?}"),
        }
    }

    #[test]
    fn test_noop_sender() {
        let sender = PipelineEventSender::none();
        assert!(!sender.is_active());
        sender.task_failed(1, "boom");
    }

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::TaskCompleted {
            task_index: 2,
            role: "Marketing".to_string(),
            duration: Duration::from_millis(1500),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"task_completed\""));
        assert!(json.contains("\"duration\":1500"));

        let parsed: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, PipelineEvent::TaskCompleted { task_index: 2, .. }));
    }
}

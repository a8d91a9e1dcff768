//! Pipeline error taxonomy
//!
//! Every variant except [`PipelineError::ArtifactNotFound`] is fatal: it
//! aborts the run and is returned to the caller. A missing artifact only
//! degrades the final report.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors that can occur while assembling or running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credentials, unknown roles, invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A task template references a name absent from the inputs
    #[error("Task {task_index} references missing placeholder '{{{placeholder}}}'")]
    MissingPlaceholder {
        task_index: usize,
        placeholder: String,
    },

    /// Structured output could not be coerced into the task's schema
    #[error("Task {task_index} output does not match schema '{schema}': {reason}")]
    SchemaValidation {
        task_index: usize,
        schema: String,
        reason: String,
    },

    /// A search or scrape call failed
    #[error("Tool '{tool}' failed: {reason}")]
    ToolInvocation { tool: String, reason: String },

    /// Expected output file absent after the run
    #[error("{name} not found yet")]
    ArtifactNotFound { name: String, path: PathBuf },

    /// The language model request failed or returned garbage
    #[error("LLM provider error: {0}")]
    Provider(String),

    /// A human rejected the task's output
    #[error("Task {task_index} rejected at confirmation{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ConfirmationRejected {
        task_index: usize,
        reason: Option<String>,
    },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A task's worker panicked or was cancelled
    ///
    /// `task_index` is `None` when the worker cannot be traced to a task.
    #[error("{} aborted: {reason}", .task_index.map(|i| format!("Task {i}")).unwrap_or_else(|| "Worker".to_string()))]
    TaskAborted {
        task_index: Option<usize>,
        reason: String,
    },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Only a missing artifact lets the run continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ArtifactNotFound { .. })
    }
}

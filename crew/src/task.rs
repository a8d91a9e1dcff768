//! Task definitions, execution modes and per-task state
//!
//! A [`Task`] is declarative: templates plus options. Before a run the
//! pipeline resolves each task against the inputs into a [`PreparedTask`]
//! (placeholders substituted, role looked up). Running a prepared task
//! yields a [`TaskRecord`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::schema::OutputSchema;

/// How the runner dispatches a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Execute and await completion before dispatching the next task
    #[default]
    Synchronous,
    /// Dispatch without waiting; joined when the pipeline finalizes
    Concurrent,
}

/// Lifecycle of a task within one run
///
/// `Pending → Dispatched → (AwaitingConfirmation) → Completed`, with
/// `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Dispatched,
    AwaitingConfirmation,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, Dispatched) => true,
            (Dispatched, AwaitingConfirmation) | (Dispatched, Completed) => true,
            // A revision request sends the task back to work
            (AwaitingConfirmation, Dispatched) | (AwaitingConfirmation, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// A unit of work bound to a role
#[derive(Debug, Clone)]
pub struct Task {
    /// Description template (may contain `{placeholder}`s)
    pub description: String,

    /// What the final answer should contain (may contain placeholders)
    pub expected_output: String,

    /// Identifier of the role that performs this task
    pub role: String,

    /// Synchronous or concurrent dispatch
    pub mode: ExecutionMode,

    /// Completion waits for a human confirmation signal
    pub requires_confirmation: bool,

    /// Structured output contract, validated after completion
    pub output_schema: Option<OutputSchema>,

    /// File the output is written to (relative paths resolve against the output directory)
    pub output_file: Option<PathBuf>,
}

impl Task {
    /// Create a synchronous task with no options
    pub fn new(
        description: impl Into<String>,
        expected_output: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            expected_output: expected_output.into(),
            role: role.into(),
            mode: ExecutionMode::Synchronous,
            requires_confirmation: false,
            output_schema: None,
            output_file: None,
        }
    }

    /// Dispatch this task without waiting for it
    pub fn concurrent(mut self) -> Self {
        self.mode = ExecutionMode::Concurrent;
        self
    }

    /// Require a confirmation signal before the task completes
    pub fn with_human_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }
}

/// A task resolved against a role registry and a set of inputs
#[derive(Debug, Clone)]
pub struct PreparedTask {
    /// Position in declared order
    pub index: usize,
    pub role: Arc<Role>,
    pub description: String,
    pub expected_output: String,
    pub mode: ExecutionMode,
    pub requires_confirmation: bool,
    pub output_schema: Option<OutputSchema>,
    pub output_file: Option<PathBuf>,
}

/// What a completed task produced
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    /// The agent's final answer, verbatim
    pub raw: String,
    /// Canonical JSON when the task has an output schema
    pub structured: Option<serde_json::Value>,
    /// Where the output was written, if the task has an output file
    pub artifact: Option<PathBuf>,
}

/// Outcome of running a task to completion
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub index: usize,
    pub role: String,
    pub mode: ExecutionMode,
    pub state: TaskState,
    pub dispatched_at: Instant,
    pub completed_at: Instant,
    /// Number of times the output was sent back for revision
    pub revisions: usize,
    pub output: TaskOutput,
}

impl TaskRecord {
    pub fn duration(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.dispatched_at)
    }
}

//! Task executors - the seam between the runner and the language model
//!
//! The runner hands an [`ExecutionRequest`] to a [`TaskExecutor`] and gets
//! the agent's final answer back. [`AgentExecutor`] is the production
//! implementation; tests plug in scripted doubles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::role::Role;
use crate::task::PreparedTask;

pub mod agent;
pub mod types;

pub use agent::AgentExecutor;

/// Everything an executor needs to perform one attempt of a task
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task_index: usize,
    pub role: Arc<Role>,
    /// Description with placeholders already substituted
    pub description: String,
    pub expected_output: String,
    /// Outputs of tasks that completed before this one was dispatched
    pub context: Vec<String>,
    /// JSON schema the answer must follow, if any
    pub output_schema: Option<serde_json::Value>,
    /// Previous answer and the feedback on it, oldest first
    pub revisions: Vec<Revision>,
}

/// An answer that was sent back, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub previous_output: String,
    pub feedback: String,
}

impl ExecutionRequest {
    pub fn for_task(task: &PreparedTask, context: Vec<String>) -> Self {
        Self {
            task_index: task.index,
            role: Arc::clone(&task.role),
            description: task.description.clone(),
            expected_output: task.expected_output.clone(),
            context,
            output_schema: task.output_schema.as_ref().map(|s| s.json_schema().clone()),
            revisions: Vec::new(),
        }
    }

    /// Number of attempts made before this one
    pub fn attempt(&self) -> usize {
        self.revisions.len()
    }
}

/// Performs a task and returns the agent's final answer
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<String>;
}

//! Role/task pipeline runner for multi-agent event planning
//!
//! This crate provides:
//! - Roles with fixed objectives and capability sets
//! - Tasks with `{placeholder}` templates, execution modes, human
//!   confirmation and typed structured output
//! - A pipeline runner that schedules synchronous and concurrent tasks
//! - An OpenAI-compatible agent executor with search and scrape tools
//! - The event planning crew (venue, logistics, marketing)
//!
//! # Example
//!
//! ```rust,ignore
//! use crew::{event_crew, AutoApproveConfirmation, PipelineRunner, RunnerConfig};
//!
//! let pipeline = event_crew::pipeline()?;
//! let runner = PipelineRunner::new(executor, Arc::new(AutoApproveConfirmation), RunnerConfig::default());
//!
//! let report = runner
//!     .run(&pipeline, &event_crew::EventDetails::default().into_inputs())
//!     .await?;
//! ```

pub mod artifact;
pub mod config;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod event_crew;
pub mod events;
pub mod executor;
pub mod pipeline;
pub mod prompts;
pub mod role;
pub mod schema;
pub mod task;
pub mod template;
pub mod tools;

pub use artifact::{render_report, ArtifactFormat, ArtifactSpec};
pub use config::{Credentials, Settings};
pub use confirmation::{
    AutoApproveConfirmation, ChannelConfirmation, Confirmation, ConfirmationGate,
    ConfirmationRequest, InteractiveConfirmation, RejectConfirmation,
};
pub use engine::{PipelineRunner, RunnerConfig};
pub use error::{PipelineError, Result};
pub use events::{event_channel, PipelineEvent};
pub use executor::{AgentExecutor, ExecutionRequest, TaskExecutor};
pub use pipeline::{Pipeline, RunReport};
pub use role::{Capability, Role, RoleRegistry};
pub use schema::OutputSchema;
pub use task::{ExecutionMode, Task, TaskOutput, TaskRecord, TaskState};
pub use template::{InputValue, Inputs};
pub use tools::ToolRegistry;

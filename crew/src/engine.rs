//! Pipeline execution engine
//!
//! Runs an assembled pipeline once:
//! - Tasks are dispatched in declared order
//! - A synchronous task is awaited before the next task is dispatched
//! - A concurrent task is spawned onto a worker pool and joined at the end;
//!   when the pool is saturated it queues and starts in declared order
//! - Outputs of tasks completed before a dispatch are passed as context
//! - The first failure aborts the run and cancels tasks still in flight

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::{Id, JoinError, JoinSet};

use crate::config::PipelineSettings;
use crate::confirmation::{Confirmation, ConfirmationGate, ConfirmationRequest};
use crate::error::{PipelineError, Result};
use crate::events::{EventSender, PipelineEventSender};
use crate::executor::{ExecutionRequest, Revision, TaskExecutor};
use crate::pipeline::{Pipeline, RunReport};
use crate::task::{ExecutionMode, PreparedTask, TaskOutput, TaskRecord, TaskState};
use crate::template::Inputs;

/// Configuration for the pipeline runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Relative output files resolve against this directory
    pub output_dir: PathBuf,

    /// Concurrent tasks allowed to execute at once (synchronous tasks are not counted)
    pub max_concurrency: usize,

    /// Revision requests honoured per task; further ones accept the last answer
    pub max_revisions: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

impl RunnerConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            max_concurrency: settings.max_concurrency,
            max_revisions: settings.max_revisions,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Where a task's output file lands
    pub fn resolve(&self, output_file: &Path) -> PathBuf {
        if output_file.is_absolute() {
            output_file.to_path_buf()
        } else {
            self.output_dir.join(output_file)
        }
    }
}

/// Pipeline execution engine
pub struct PipelineRunner {
    executor: Arc<dyn TaskExecutor>,
    gate: Arc<dyn ConfirmationGate>,
    config: RunnerConfig,
    events: PipelineEventSender,
}

impl PipelineRunner {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        gate: Arc<dyn ConfirmationGate>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            executor,
            gate,
            config,
            events: PipelineEventSender::none(),
        }
    }

    /// Set event sender for real-time progress
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.events = PipelineEventSender::new(sender);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every task of `pipeline` against `inputs`
    ///
    /// Placeholders are resolved for all tasks before the first dispatch.
    pub async fn run(&self, pipeline: &Pipeline, inputs: &Inputs) -> Result<RunReport> {
        if self.config.max_concurrency == 0 {
            return Err(PipelineError::configuration(
                "max_concurrency must be at least 1",
            ));
        }

        let prepared = pipeline.prepare(inputs)?;
        let task_count = prepared.len();
        let started_at = Utc::now();
        let run_start = Instant::now();

        tracing::info!(
            tasks = task_count,
            gate = self.gate.name(),
            output_dir = %self.config.output_dir.display(),
            "pipeline started"
        );

        let worker = Arc::new(TaskWorker {
            executor: Arc::clone(&self.executor),
            gate: Arc::clone(&self.gate),
            config: self.config.clone(),
            events: self.events.clone(),
        });

        let mut scheduler = Scheduler {
            worker,
            permits: Arc::new(Semaphore::new(self.config.max_concurrency)),
            join_set: JoinSet::new(),
            in_flight: HashMap::new(),
            queued: VecDeque::new(),
            records: (0..task_count).map(|_| None).collect(),
        };

        if let Err(e) = scheduler.drive(prepared).await {
            let cancelled = scheduler.join_set.len();
            scheduler.join_set.shutdown().await;
            tracing::error!(cancelled, "pipeline aborted: {}", e);
            return Err(e);
        }

        let tasks = scheduler
            .records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                record.ok_or_else(|| PipelineError::TaskAborted {
                    task_index: Some(index),
                    reason: "task never completed".to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let duration = run_start.elapsed();
        self.events.pipeline_completed(task_count, duration);
        tracing::info!(
            tasks = task_count,
            duration_ms = duration.as_millis() as u64,
            "pipeline completed"
        );

        Ok(RunReport {
            started_at,
            duration,
            tasks,
        })
    }
}

/// Dispatch state for one run
struct Scheduler {
    worker: Arc<TaskWorker>,
    permits: Arc<Semaphore>,
    join_set: JoinSet<Result<TaskRecord>>,
    /// Spawned task id → declared task index
    in_flight: HashMap<Id, usize>,
    /// Concurrent tasks waiting for a permit, in declared order
    queued: VecDeque<(PreparedTask, Vec<String>)>,
    records: Vec<Option<TaskRecord>>,
}

impl Scheduler {
    async fn drive(&mut self, prepared: Vec<PreparedTask>) -> Result<()> {
        for task in prepared {
            // Pick up concurrent tasks that finished since the last dispatch
            while let Some(joined) = self.join_set.try_join_next_with_id() {
                self.settle(joined)?;
            }

            let context = self.completed_outputs();
            match task.mode {
                ExecutionMode::Concurrent => self.dispatch_concurrent(task, context)?,
                ExecutionMode::Synchronous => self.run_inline(task, context).await?,
            }
        }

        loop {
            self.start_queued();
            match self.join_set.join_next_with_id().await {
                Some(joined) => self.settle(joined)?,
                None if self.queued.is_empty() => return Ok(()),
                // Nothing in flight holds a permit, yet none could be taken
                None => {
                    return Err(PipelineError::TaskAborted {
                        task_index: self.queued.front().map(|(task, _)| task.index),
                        reason: "no worker permit available".to_string(),
                    });
                }
            }
        }
    }

    /// Start a concurrent task now, or queue it behind earlier ones
    fn dispatch_concurrent(&mut self, task: PreparedTask, context: Vec<String>) -> Result<()> {
        if !self.queued.is_empty() {
            self.queued.push_back((task, context));
            return Ok(());
        }
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                self.spawn(task, context, permit);
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => {
                tracing::debug!(task = task.index, "worker pool saturated, task queued");
                self.queued.push_back((task, context));
                Ok(())
            }
            Err(TryAcquireError::Closed) => Err(PipelineError::TaskAborted {
                task_index: Some(task.index),
                reason: "worker pool closed".to_string(),
            }),
        }
    }

    /// Start queued tasks while permits are free
    fn start_queued(&mut self) {
        while !self.queued.is_empty() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            if let Some((task, context)) = self.queued.pop_front() {
                self.spawn(task, context, permit);
            }
        }
    }

    fn spawn(&mut self, task: PreparedTask, context: Vec<String>, permit: OwnedSemaphorePermit) {
        let index = task.index;
        let worker = Arc::clone(&self.worker);

        let handle = self.join_set.spawn(async move {
            let _permit = permit;
            worker.run(task, context).await
        });
        self.in_flight.insert(handle.id(), index);
    }

    /// Await a synchronous task while still watching concurrent ones fail
    async fn run_inline(&mut self, task: PreparedTask, context: Vec<String>) -> Result<()> {
        let worker = Arc::clone(&self.worker);
        let inline = worker.run(task, context);
        tokio::pin!(inline);

        let record = loop {
            tokio::select! {
                result = &mut inline => break result?,
                Some(joined) = self.join_set.join_next_with_id(), if !self.join_set.is_empty() => {
                    self.settle(joined)?;
                }
            }
        };

        let index = record.index;
        self.records[index] = Some(record);
        Ok(())
    }

    fn settle(&mut self, joined: std::result::Result<(Id, Result<TaskRecord>), JoinError>) -> Result<()> {
        match joined {
            Ok((id, outcome)) => {
                self.in_flight.remove(&id);
                let record = outcome?;
                let index = record.index;
                self.records[index] = Some(record);
                // The finished worker released its permit
                self.start_queued();
                Ok(())
            }
            Err(join_error) => {
                let task_index = self.in_flight.remove(&join_error.id());
                let reason = if join_error.is_panic() {
                    "worker panicked".to_string()
                } else {
                    "worker cancelled".to_string()
                };
                Err(PipelineError::TaskAborted { task_index, reason })
            }
        }
    }

    /// Raw outputs of completed tasks, in declared order
    fn completed_outputs(&self) -> Vec<String> {
        self.records
            .iter()
            .flatten()
            .map(|record| record.output.raw.clone())
            .collect()
    }
}

/// Executes a single task through execution, validation, confirmation and output
struct TaskWorker {
    executor: Arc<dyn TaskExecutor>,
    gate: Arc<dyn ConfirmationGate>,
    config: RunnerConfig,
    events: PipelineEventSender,
}

impl TaskWorker {
    async fn run(&self, task: PreparedTask, context: Vec<String>) -> Result<TaskRecord> {
        let dispatched_at = Instant::now();
        let mut state = TaskState::Pending;
        advance(task.index, &mut state, TaskState::Dispatched);

        self.events
            .task_dispatched(task.index, task.role.id(), task.mode);
        tracing::info!(
            task = task.index,
            role = task.role.id(),
            mode = ?task.mode,
            context = context.len(),
            "task dispatched"
        );

        match self.perform(&task, context, &mut state).await {
            Ok((output, revisions)) => {
                advance(task.index, &mut state, TaskState::Completed);
                let completed_at = Instant::now();
                let duration = completed_at.saturating_duration_since(dispatched_at);

                self.events.task_completed(task.index, task.role.id(), duration);
                tracing::info!(
                    task = task.index,
                    role = task.role.id(),
                    revisions,
                    duration_ms = duration.as_millis() as u64,
                    "task completed"
                );

                Ok(TaskRecord {
                    index: task.index,
                    role: task.role.id().to_string(),
                    mode: task.mode,
                    state,
                    dispatched_at,
                    completed_at,
                    revisions,
                    output,
                })
            }
            Err(e) => {
                advance(task.index, &mut state, TaskState::Failed);
                self.events.task_failed(task.index, &e.to_string());
                tracing::error!(task = task.index, role = task.role.id(), "task failed: {}", e);
                Err(e)
            }
        }
    }

    async fn perform(
        &self,
        task: &PreparedTask,
        context: Vec<String>,
        state: &mut TaskState,
    ) -> Result<(TaskOutput, usize)> {
        let mut request = ExecutionRequest::for_task(task, context);

        loop {
            let raw = self.executor.execute(&request).await?;

            // Validation comes before confirmation so nobody approves a broken record
            let structured = match &task.output_schema {
                Some(schema) => Some(schema.validate(&raw).map_err(|mismatch| {
                    PipelineError::SchemaValidation {
                        task_index: task.index,
                        schema: schema.name().to_string(),
                        reason: mismatch.0,
                    }
                })?),
                None => None,
            };

            if task.requires_confirmation {
                advance(task.index, state, TaskState::AwaitingConfirmation);
                let confirmation = ConfirmationRequest::new(
                    task.index,
                    request.attempt(),
                    task.role.id(),
                    task.description.as_str(),
                    raw.as_str(),
                );
                self.events
                    .awaiting_confirmation(task.index, &confirmation.id);
                tracing::info!(task = task.index, request_id = %confirmation.id, "awaiting confirmation");

                match self.gate.confirm(confirmation).await? {
                    Confirmation::Approved => {}
                    Confirmation::Rejected(reason) => {
                        return Err(PipelineError::ConfirmationRejected {
                            task_index: task.index,
                            reason,
                        });
                    }
                    Confirmation::Revise(feedback) if request.revisions.len() < self.config.max_revisions => {
                        request.revisions.push(Revision {
                            previous_output: raw,
                            feedback: feedback.clone(),
                        });
                        advance(task.index, state, TaskState::Dispatched);
                        self.events
                            .task_revised(task.index, request.revisions.len(), &feedback);
                        tracing::info!(task = task.index, revision = request.revisions.len(), "revision requested");
                        continue;
                    }
                    Confirmation::Revise(_) => {
                        tracing::warn!(
                            task = task.index,
                            "revision limit ({}) reached, accepting last answer",
                            self.config.max_revisions
                        );
                    }
                }
            }

            let artifact = match &task.output_file {
                Some(file) => {
                    let path = self.config.resolve(file);
                    write_artifact(&path, &raw, structured.as_ref()).await?;
                    self.events.artifact_written(task.index, &path);
                    tracing::info!(task = task.index, path = %path.display(), "output written");
                    Some(path)
                }
                None => None,
            };

            let revisions = request.revisions.len();
            return Ok((
                TaskOutput {
                    raw,
                    structured,
                    artifact,
                },
                revisions,
            ));
        }
    }
}

fn advance(task_index: usize, state: &mut TaskState, next: TaskState) {
    debug_assert!(
        state.can_transition_to(next),
        "task {task_index}: illegal transition {state:?} -> {next:?}"
    );
    tracing::trace!(task = task_index, from = ?*state, to = ?next, "task state");
    *state = next;
}

/// Write a task's output, replacing any previous file in one step
///
/// Structured output is written as pretty-printed canonical JSON.
async fn write_artifact(path: &Path, raw: &str, structured: Option<&serde_json::Value>) -> Result<()> {
    let contents = match structured {
        Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let staging = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&staging, contents)
        .await
        .map_err(|e| PipelineError::io(&staging, e))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

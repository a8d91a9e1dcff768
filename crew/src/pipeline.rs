//! Pipeline assembly and run reports
//!
//! [`Pipeline::assemble`] checks the static wiring (every task's role is
//! registered, no two tasks own the same output file). [`Pipeline::prepare`]
//! substitutes the run's inputs into every task before anything is
//! dispatched, so a missing placeholder fails the run up front.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::role::RoleRegistry;
use crate::task::{PreparedTask, Task, TaskRecord};
use crate::template::{render, Inputs};

/// Roles and tasks assembled into a single execution unit
#[derive(Debug, Clone)]
pub struct Pipeline {
    roles: RoleRegistry,
    tasks: Vec<Task>,
}

impl Pipeline {
    /// Assemble roles and tasks, validating the wiring
    pub fn assemble(roles: RoleRegistry, tasks: Vec<Task>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(PipelineError::configuration("pipeline has no tasks"));
        }

        let mut output_files = HashSet::new();
        for (index, task) in tasks.iter().enumerate() {
            if !roles.contains(&task.role) {
                return Err(PipelineError::configuration(format!(
                    "task {} references unknown role '{}' (known roles: {})",
                    index,
                    task.role,
                    roles.ids().collect::<Vec<_>>().join(", ")
                )));
            }
            if let Some(path) = &task.output_file {
                if !output_files.insert(path.clone()) {
                    return Err(PipelineError::configuration(format!(
                        "output file '{}' is written by more than one task",
                        path.display()
                    )));
                }
            }
        }

        Ok(Self { roles, tasks })
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Output files declared by the tasks, in task order
    pub fn output_files(&self) -> Vec<PathBuf> {
        self.tasks
            .iter()
            .filter_map(|t| t.output_file.clone())
            .collect()
    }

    /// Resolve every task against `inputs`
    pub fn prepare(&self, inputs: &Inputs) -> Result<Vec<PreparedTask>> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let missing = |e: crate::template::UnresolvedPlaceholder| {
                    PipelineError::MissingPlaceholder {
                        task_index: index,
                        placeholder: e.0,
                    }
                };
                let description = render(&task.description, inputs).map_err(missing)?;
                let expected_output = render(&task.expected_output, inputs).map_err(missing)?;

                let role = self.roles.get(&task.role).cloned().ok_or_else(|| {
                    PipelineError::configuration(format!("unknown role '{}'", task.role))
                })?;

                Ok(PreparedTask {
                    index,
                    role,
                    description,
                    expected_output,
                    mode: task.mode,
                    requires_confirmation: task.requires_confirmation,
                    output_schema: task.output_schema.clone(),
                    output_file: task.output_file.clone(),
                })
            })
            .collect()
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// One record per task, in declared order
    pub tasks: Vec<TaskRecord>,
}

impl RunReport {
    pub fn task(&self, index: usize) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.index == index)
    }

    /// Files written during the run
    pub fn artifacts(&self) -> Vec<&PathBuf> {
        self.tasks
            .iter()
            .filter_map(|t| t.output.artifact.as_ref())
            .collect()
    }

    /// Raw output of the last task in declared order
    pub fn final_output(&self) -> Option<&str> {
        self.tasks.last().map(|t| t.output.raw.as_str())
    }

    pub fn total_revisions(&self) -> usize {
        self.tasks.iter().map(|t| t.revisions).sum()
    }
}

//! Result types for workspace operations
//!
//! What the workspace manager hands back to front ends for listing, planning
//! and graph output.

use std::collections::HashMap;

use colored::Color;

use crate::configs::tasks::TaskConfig;
use crate::task_execution::TaskExecutionPlan;

/// Summary of one task for listings and the picker.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub label: String,
    /// Declared type, `shell` when omitted.
    pub task_type: String,
    pub detail: Option<String>,
    pub dependencies: Vec<String>,
    pub background: bool,
    /// Group kind, e.g. `build`, with the default flag.
    pub group: Option<(String, bool)>,
}

/// Result of listing the workspace tasks
#[derive(Debug)]
pub struct TaskListResult {
    pub tasks: Vec<TaskInfo>,
    pub task_colors: HashMap<String, Color>,
}

/// Result of getting the dependency graph
#[derive(Debug)]
pub struct DependencyGraphResult {
    pub graph: Option<petgraph::Graph<String, ()>>,
    pub cycles: Vec<Vec<String>>,
    pub missing: Vec<(String, String)>,
}

/// Result of task execution planning
#[derive(Debug)]
pub struct TaskPlanResult {
    pub plan: TaskExecutionPlan,
    pub task_colors: HashMap<String, Color>,
}

impl From<&TaskConfig> for TaskInfo {
    fn from(task: &TaskConfig) -> Self {
        let task_type = task
            .task_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("shell")
            .to_string();

        Self {
            label: task.label.clone(),
            task_type,
            detail: task.detail.clone().filter(|d| !d.is_empty()),
            dependencies: task.dependency_labels().to_vec(),
            background: task.is_background,
            group: task
                .group
                .as_ref()
                .map(|group| (group.kind().to_string(), group.is_default())),
        }
    }
}

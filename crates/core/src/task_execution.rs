//! Dry-run execution planning
//!
//! Expands a task the way a run would, without starting anything. Dependencies
//! come before the task that needs them, and a label may appear only once per
//! plan: reaching it again is reported as a cycle, as a real run would.

use std::collections::{HashMap, HashSet};

use crate::configs::tasks::TaskConfig;
use crate::execution::dependencies::{dependency_failed, DependsOrder};
use crate::types::{VstaskError, VstaskResult};

/// One task launch in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub label: String,
    /// 0 for the requested task, 1 for its direct dependencies and so on.
    pub depth: usize,
    /// How this step runs relative to its siblings; `None` for the root.
    pub order: Option<DependsOrder>,
    /// Whether a dependent continues once the step reports readiness.
    pub background: bool,
}

/// Steps in the order they would start under sequential dependencies.
#[derive(Debug, Clone)]
pub struct TaskExecutionPlan {
    pub task_label: String,
    pub steps: Vec<PlanStep>,
}

impl TaskExecutionPlan {
    /// Labels in step order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.label.as_str()).collect()
    }
}

/// Plan the run of `label` against the label index.
pub fn resolve_task_execution_plan(
    index: &HashMap<String, TaskConfig>,
    label: &str,
) -> VstaskResult<TaskExecutionPlan> {
    if !index.contains_key(label) {
        return Err(VstaskError::TaskNotFound(label.to_string()));
    }

    let mut steps = Vec::new();
    expand(index, label, 0, None, &mut HashSet::new(), &mut steps)?;

    Ok(TaskExecutionPlan {
        task_label: label.to_string(),
        steps,
    })
}

fn expand(
    index: &HashMap<String, TaskConfig>,
    label: &str,
    depth: usize,
    order: Option<DependsOrder>,
    visited: &mut HashSet<String>,
    steps: &mut Vec<PlanStep>,
) -> VstaskResult<()> {
    if !visited.insert(label.to_string()) {
        return Err(VstaskError::DependencyCycle(label.to_string()));
    }
    let task = index
        .get(label)
        .ok_or_else(|| VstaskError::MissingDependency(label.to_string()))?;

    let labels = task.dependency_labels();
    for dep in labels {
        if visited.contains(dep) {
            return Err(VstaskError::DependencyCycle(dep.clone()));
        }
        if !index.contains_key(dep) {
            return Err(VstaskError::MissingDependency(dep.clone()));
        }
    }

    let child_order = DependsOrder::of(task);
    for dep in labels {
        expand(index, dep, depth + 1, Some(child_order), visited, steps)
            .map_err(|err| dependency_failed(dep, err))?;
    }

    steps.push(PlanStep {
        label: label.to_string(),
        depth,
        order,
        background: task.is_background,
    });
    Ok(())
}

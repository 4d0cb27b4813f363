//! High-level workspace management interface
//!
//! [`WorkspaceManager`] is what front ends talk to. It finds the project root,
//! loads `.vscode/tasks.json` and builds the dependency graph once, then
//! answers listing, planning and graph queries and starts runs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vstask_core::execution::TaskRunnerConfig;
//! use vstask_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> vstask_core::types::VstaskResult<()> {
//! let manager = WorkspaceManager::new(WorkspaceManagerConfig {
//!     start_dir: PathBuf::from("."),
//! })?;
//!
//! let tasks = manager.list_tasks();
//! let plan = manager.get_execution_plan("build")?;
//! manager.run_task("build", TaskRunnerConfig::from_env()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::configs::tasks::{load_tasks_file, TaskConfig, TasksFileConfig};
use crate::execution::{TaskRunner, TaskRunnerConfig};
use crate::inputs::Prompter;
use crate::results::{DependencyGraphResult, TaskInfo, TaskListResult, TaskPlanResult};
use crate::task_execution::resolve_task_execution_plan;
use crate::tasks::{index_by_label, ordered_labels, task_colors};
use crate::types::{VstaskError, VstaskResult};
use crate::workspace::{build_dependency_graph, find_project_root, tasks_file_path, Workspace};

/// Configuration for initializing a workspace manager
#[derive(Debug, Clone)]
pub struct WorkspaceManagerConfig {
    /// Directory the project root search starts from.
    pub start_dir: PathBuf,
}

/// High-level workspace manager that encapsulates all workspace operations
pub struct WorkspaceManager {
    pub workspace: Workspace,
    pub tasks_file: TasksFileConfig,
    index: HashMap<String, TaskConfig>,
}

impl WorkspaceManager {
    /// Find the project root above `start_dir` and load its tasks.
    pub fn new(config: WorkspaceManagerConfig) -> VstaskResult<Self> {
        let root = find_project_root(&config.start_dir)?;
        let path = tasks_file_path(&root);
        if !path.is_file() {
            return Err(VstaskError::Config(format!(
                "tasks.json not found in {}",
                root.join(crate::workspace::VSCODE_DIR).display()
            )));
        }
        let tasks_file = load_tasks_file(&path)?;
        debug!(root = %root.display(), tasks = tasks_file.tasks.len(), "loaded tasks");

        Ok(Self::from_tasks_file(root, tasks_file))
    }

    /// Manager over an already parsed tasks file.
    pub fn from_tasks_file(root: PathBuf, tasks_file: TasksFileConfig) -> Self {
        let mut workspace = Workspace::new(root, tasks_file.tasks.clone());
        build_dependency_graph(&mut workspace);

        Self {
            index: index_by_label(tasks_file.tasks.clone()),
            workspace,
            tasks_file,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.workspace.root
    }

    /// Task labels in file order.
    pub fn labels(&self) -> Vec<String> {
        ordered_labels(&self.tasks_file.tasks)
    }

    pub fn task(&self, label: &str) -> Option<&TaskConfig> {
        self.index.get(label)
    }

    /// All tasks in file order, duplicates resolved to their last definition.
    pub fn list_tasks(&self) -> TaskListResult {
        let tasks: Vec<TaskInfo> = self
            .labels()
            .iter()
            .filter_map(|label| self.index.get(label))
            .map(TaskInfo::from)
            .collect();
        let task_colors = task_colors(tasks.iter().map(|task| task.label.as_str()));

        TaskListResult { tasks, task_colors }
    }

    /// Dry-run plan for `label`.
    pub fn get_execution_plan(&self, label: &str) -> VstaskResult<TaskPlanResult> {
        let plan = resolve_task_execution_plan(&self.index, label)?;
        let task_colors = task_colors(plan.steps.iter().map(|step| step.label.as_str()));
        Ok(TaskPlanResult { plan, task_colors })
    }

    pub fn get_dependency_graph(&self) -> DependencyGraphResult {
        DependencyGraphResult {
            graph: self.workspace.dep_graph.clone(),
            cycles: self.workspace.dependency_cycles.clone(),
            missing: self.workspace.missing_dependencies.clone(),
        }
    }

    /// Run `label` and its dependencies with the terminal prompter.
    pub async fn run_task(&self, label: &str, config: TaskRunnerConfig) -> VstaskResult<()> {
        let runner = self.runner(config, None);
        runner.run(label).await
    }

    /// Run with a caller-supplied prompter for `${input:...}` values.
    pub async fn run_task_with_prompter(
        &self,
        label: &str,
        config: TaskRunnerConfig,
        prompter: Arc<dyn Prompter>,
    ) -> VstaskResult<()> {
        let runner = self.runner(config, Some(prompter));
        runner.run(label).await
    }

    fn runner(&self, config: TaskRunnerConfig, prompter: Option<Arc<dyn Prompter>>) -> Arc<TaskRunner> {
        let root = &self.workspace.root;
        let tasks_file = self.tasks_file.clone();
        Arc::new(match prompter {
            Some(prompter) => TaskRunner::with_prompter(tasks_file, root, config, prompter),
            None => TaskRunner::new(tasks_file, root, config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(tasks_json: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vscode")).unwrap();
        if let Some(json) = tasks_json {
            std::fs::write(dir.path().join(".vscode/tasks.json"), json).unwrap();
        }
        dir
    }

    #[test]
    fn test_new_loads_tasks_from_nested_start() {
        let dir = project(Some(
            r#"{
                // comments and trailing commas are tolerated
                "version": "2.0.0",
                "tasks": [
                    { "label": "build", "detail": "compile everything", "dependsOn": "lint",
                      "group": { "kind": "build", "isDefault": true } },
                    { "label": "lint", "type": "process", "command": "true", },
                ],
            }"#,
        ));
        let nested = dir.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();

        let manager = WorkspaceManager::new(WorkspaceManagerConfig { start_dir: nested }).unwrap();
        assert_eq!(manager.root(), dir.path().canonicalize().unwrap());
        assert_eq!(manager.labels(), ["build", "lint"]);

        let list = manager.list_tasks();
        assert_eq!(list.tasks.len(), 2);
        assert_eq!(list.tasks[0].task_type, "shell");
        assert_eq!(list.tasks[0].detail.as_deref(), Some("compile everything"));
        assert_eq!(list.tasks[0].dependencies, ["lint"]);
        assert_eq!(list.tasks[0].group, Some(("build".to_string(), true)));
        assert_eq!(list.tasks[1].task_type, "process");
        assert!(list.task_colors.contains_key("lint"));
    }

    #[test]
    fn test_new_without_tasks_file() {
        let dir = project(None);
        let err = WorkspaceManager::new(WorkspaceManagerConfig {
            start_dir: dir.path().to_path_buf(),
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("tasks.json not found"));
    }

    #[test]
    fn test_plan_and_graph() {
        let dir = project(Some(
            r#"{ "tasks": [
                { "label": "a", "dependsOn": ["b", "c"] },
                { "label": "b", "dependsOn": "c" },
                { "label": "c" },
                { "label": "x", "dependsOn": "x" }
            ] }"#,
        ));
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            start_dir: dir.path().to_path_buf(),
        })
        .unwrap();

        let result = manager.get_execution_plan("b").unwrap();
        assert_eq!(result.plan.labels(), ["c", "b"]);
        assert_eq!(result.task_colors.len(), 2);

        let err = manager.get_execution_plan("a").unwrap_err();
        assert!(matches!(err.root_cause(), VstaskError::DependencyCycle(l) if l == "c"));

        let graph = manager.get_dependency_graph();
        assert_eq!(graph.graph.unwrap().edge_count(), 4);
        assert_eq!(graph.cycles, vec![vec!["x".to_string()]]);
        assert!(graph.missing.is_empty());

        assert!(manager.get_execution_plan("x").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_task_executes_dependencies() {
        use crate::process::{ProcessRunnerConfig, PtyMode, SignalSet};

        let dir = project(Some(
            r#"{ "tasks": [
                { "label": "all", "command": "echo all >> log", "dependsOn": "first" },
                { "label": "first", "command": "echo first >> log" }
            ] }"#,
        ));
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            start_dir: dir.path().to_path_buf(),
        })
        .unwrap();

        let config = TaskRunnerConfig {
            process: ProcessRunnerConfig {
                pty: PtyMode::Disable,
            },
            signals: SignalSet::none(),
            base_env: std::env::vars().collect(),
            process_cwd: dir.path().to_path_buf(),
            input_overrides: HashMap::new(),
        };
        manager.run_task("all", config.clone()).await.unwrap();
        let log = std::fs::read_to_string(dir.path().join("log")).unwrap();
        assert_eq!(log, "first\nall\n");

        let err = manager.run_task("missing", config).await.unwrap_err();
        assert!(matches!(err, VstaskError::TaskNotFound(_)));
    }
}

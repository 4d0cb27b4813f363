//! High-level task runner
//!
//! Coordinates one run: the root task and, depth first, everything it depends
//! on. Each execution derives the effective task for this platform, resolves
//! its inputs and variables, builds the command and hands it to the process
//! runner.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::configs::tasks::{TaskConfig, TasksFileConfig};
use crate::execution::command::CommandBuilder;
use crate::execution::dependencies::Visited;
use crate::inputs::{
    collect_input_refs, input_overrides_from_env, replace_inputs, InputResolver, Prompter,
    TerminalPrompter,
};
use crate::platform::{effective_task, Platform};
use crate::process::{
    signals, BackgroundMatcher, ProcessRunner, ProcessRunnerConfig, RunMode, RunOutcome, SignalSet,
};
use crate::tasks::{get_task_color, index_by_label};
use crate::types::{VstaskError, VstaskResult};
use crate::variables::{VariableContext, VariableMap};

/// Everything a run takes from its surroundings, captured once.
#[derive(Debug, Clone)]
pub struct TaskRunnerConfig {
    pub process: ProcessRunnerConfig,
    /// Signals that cancel the run.
    pub signals: SignalSet,
    /// Environment every child starts from.
    pub base_env: Vec<(String, String)>,
    /// Directory bound to `${cwd}` while the task's own cwd is resolved.
    pub process_cwd: PathBuf,
    /// `VSTASK_INPUT_*` values keyed by uppercased input id.
    pub input_overrides: HashMap<String, String>,
}

impl TaskRunnerConfig {
    /// Capture the process environment, working directory and flags.
    pub fn from_env() -> Self {
        let base_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let process_cwd = std::env::current_dir()
            .ok()
            .or_else(dirs::home_dir)
            .unwrap_or_default();

        Self {
            process: ProcessRunnerConfig::from_env(),
            signals: SignalSet::platform_default(),
            base_env,
            process_cwd,
            input_overrides: input_overrides_from_env(),
        }
    }
}

/// Runs tasks from one tasks file.
pub struct TaskRunner {
    index: HashMap<String, TaskConfig>,
    platform: Platform,
    workspace_root: PathBuf,
    variables: VariableContext,
    inputs: InputResolver,
    commands: CommandBuilder,
    process: ProcessRunner,
    config: TaskRunnerConfig,
}

impl TaskRunner {
    pub fn new(tasks_file: TasksFileConfig, workspace_root: &Path, config: TaskRunnerConfig) -> Self {
        Self::with_prompter(tasks_file, workspace_root, config, Arc::new(TerminalPrompter))
    }

    pub fn with_prompter(
        tasks_file: TasksFileConfig,
        workspace_root: &Path,
        config: TaskRunnerConfig,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let platform = Platform::current();
        let TasksFileConfig { tasks, inputs, .. } = tasks_file;

        Self {
            variables: VariableContext::detect(workspace_root, &tasks),
            index: index_by_label(tasks),
            platform,
            workspace_root: workspace_root.to_path_buf(),
            inputs: InputResolver::new(inputs, config.input_overrides.clone(), prompter),
            commands: CommandBuilder::new(platform),
            process: ProcessRunner::native(config.process.clone()),
            config,
        }
    }

    pub(crate) fn task(&self, label: &str) -> Option<&TaskConfig> {
        self.index.get(label)
    }

    /// Run `label` to completion after its dependencies.
    pub async fn run(self: &Arc<Self>, label: &str) -> VstaskResult<()> {
        if self.task(label).is_none() {
            return Err(VstaskError::TaskNotFound(label.to_string()));
        }

        let cancel = CancellationToken::new();
        let _signals = signals::listen(&self.config.signals, cancel.clone())?;

        Arc::clone(self)
            .run_node(
                label.to_string(),
                RunMode::Foreground,
                Visited::default(),
                cancel,
            )
            .await
            .map(|_| ())
    }

    /// Execute a single task without looking at its dependencies.
    pub(crate) async fn execute(
        &self,
        task: &TaskConfig,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> VstaskResult<RunOutcome> {
        if cancel.is_cancelled() {
            return Err(VstaskError::Cancelled);
        }
        let effective = effective_task(task, self.platform);

        let ids = collect_input_refs(&effective);
        let inputs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VstaskError::Cancelled),
            inputs = self.inputs.resolve_all(&ids) => inputs?,
        };

        let preliminary = self.variables.variables(&self.config.process_cwd);
        let cwd = self.resolve_cwd(&effective, &inputs, &preliminary);
        let variables = self.variables.variables(&cwd);
        let substitute = |value: &str| variables.substitute(&replace_inputs(value, &inputs));

        let mut resolved = effective.clone();
        resolved.command = effective.command.as_deref().map(substitute);
        resolved.args = effective.args.iter().map(|arg| substitute(arg)).collect();
        let task_env: BTreeMap<String, String> = effective
            .options
            .iter()
            .flat_map(|options| options.env.iter())
            .map(|(key, value)| (key.clone(), substitute(value)))
            .collect();
        let env = merge_env(&self.config.base_env, &task_env);

        let command = self.commands.build(&resolved, &cwd, env)?;
        let matcher = BackgroundMatcher::from_task(&effective);

        let color = get_task_color(&task.label);
        println!();
        println!(
            "┌─ {}",
            format!("Running task: {}", task.label).color(color).bold()
        );
        println!("└─ {}", command.display_line().bright_black());
        info!(task = %task.label, cwd = %cwd.display(), "running task");

        let outcome = self
            .process
            .run(&command, matcher.as_ref(), mode, cancel)
            .await?;
        if outcome == RunOutcome::Ready {
            println!(
                "{} {}",
                "✓".green().bold(),
                format!("{} is ready", task.label).color(color)
            );
        }
        Ok(outcome)
    }

    /// Task cwd with inputs and preliminary variables applied; relative
    /// results are taken from the workspace root.
    fn resolve_cwd(
        &self,
        task: &TaskConfig,
        inputs: &HashMap<String, String>,
        preliminary: &VariableMap,
    ) -> PathBuf {
        let configured = task
            .options
            .as_ref()
            .and_then(|options| options.cwd.as_deref())
            .filter(|cwd| !cwd.is_empty());

        match configured {
            Some(cwd) => {
                let cwd = PathBuf::from(preliminary.substitute(&replace_inputs(cwd, inputs)));
                if cwd.is_absolute() {
                    cwd
                } else {
                    self.workspace_root.join(cwd)
                }
            }
            None => self.workspace_root.clone(),
        }
    }
}

/// `base` with `overrides` applied: existing keys keep their position, new
/// keys are appended.
pub fn merge_env(
    base: &[(String, String)],
    overrides: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = base
        .iter()
        .map(|(key, value)| (key.clone(), overrides.get(key).unwrap_or(value).clone()))
        .collect();

    let present: HashSet<&str> = base.iter().map(|(key, _)| key.as_str()).collect();
    merged.extend(
        overrides
            .iter()
            .filter(|(key, _)| !present.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;

    #[test]
    fn test_merge_env_task_values_win() {
        let base = vec![
            ("PATH".to_string(), "/bin".to_string()),
            ("MODE".to_string(), "base".to_string()),
        ];
        let overrides = BTreeMap::from([
            ("MODE".to_string(), "task".to_string()),
            ("EXTRA".to_string(), "1".to_string()),
        ]);
        assert_eq!(
            merge_env(&base, &overrides),
            [
                ("PATH".to_string(), "/bin".to_string()),
                ("MODE".to_string(), "task".to_string()),
                ("EXTRA".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolve_cwd_relative_absolute_and_default() {
        let root = tempfile::tempdir().unwrap();
        let config = parse_tasks_config(
            r#"{ "tasks": [
                { "label": "rel", "options": { "cwd": "${input:dir}/pkg" } },
                { "label": "abs", "options": { "cwd": "${cwd}/abs" } },
                { "label": "none" }
            ] }"#,
        )
        .unwrap();
        let runner_config = TaskRunnerConfig {
            process: ProcessRunnerConfig::default(),
            signals: SignalSet::none(),
            base_env: Vec::new(),
            process_cwd: PathBuf::from("/launch"),
            input_overrides: HashMap::new(),
        };
        let runner = TaskRunner::new(config, root.path(), runner_config);
        let inputs = HashMap::from([("dir".to_string(), "apps".to_string())]);
        let preliminary = runner.variables.variables(Path::new("/launch"));

        let rel = runner.resolve_cwd(runner.task("rel").unwrap(), &inputs, &preliminary);
        assert_eq!(rel, root.path().join("apps/pkg"));

        let abs = runner.resolve_cwd(runner.task("abs").unwrap(), &inputs, &preliminary);
        assert_eq!(abs, PathBuf::from("/launch/abs"));

        let none = runner.resolve_cwd(runner.task("none").unwrap(), &inputs, &preliminary);
        assert_eq!(none, root.path());
    }
}

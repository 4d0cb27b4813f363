use std::io::IsTerminal;

use anyhow::Result;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Select};
use vstask_core::execution::TaskRunnerConfig;
use vstask_core::workspace_manager::WorkspaceManager;
use vstask_core::VstaskError;

pub async fn execute(
    manager: &WorkspaceManager,
    label: Option<String>,
    config: TaskRunnerConfig,
) -> Result<()> {
    let label = match label {
        Some(label) => label,
        None => match pick_task(manager)? {
            Some(label) => label,
            None => return Ok(()),
        },
    };

    if let Err(err) = manager.run_task(&label, config).await {
        if matches!(err.root_cause(), VstaskError::Cancelled) {
            // A prompt still blocked on stdin would hold up runtime shutdown.
            eprintln!("{}", format!("task {:?} cancelled", label).yellow());
            std::process::exit(130);
        }
        anyhow::bail!("task {:?} failed: {}", label, err);
    }

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        format!("{} completed", label).green().bold()
    );

    Ok(())
}

/// Interactive choice among the task labels, `None` when dismissed.
fn pick_task(manager: &WorkspaceManager) -> Result<Option<String>> {
    let tasks = manager.list_tasks().tasks;
    if tasks.is_empty() {
        anyhow::bail!("no tasks defined in {}", manager.workspace.tasks_file().display());
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("no task label given and no terminal to pick one from");
    }

    let items: Vec<String> = tasks
        .iter()
        .map(|task| match &task.detail {
            Some(detail) => format!("{}  {}", task.label, detail.dimmed()),
            None => task.label.clone(),
        })
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a task to run")
        .items(&items)
        .default(0)
        .interact_opt()?;

    Ok(selection.map(|index| tasks[index].label.clone()))
}

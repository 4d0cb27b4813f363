use anyhow::Result;
use colored::*;
use vstask_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager) -> Result<()> {
    let result = manager.list_tasks();

    println!("{}", "Tasks".bold().underline());

    if result.tasks.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(());
    }

    for task in &result.tasks {
        let color = result.task_colors[&task.label];
        let mut line = format!(
            "{} {}",
            task.label.color(color).bold(),
            format!("[{}]", task.task_type).dimmed()
        );
        if let Some((kind, is_default)) = &task.group {
            let group = if *is_default {
                format!("default {}", kind)
            } else {
                kind.clone()
            };
            line.push_str(&format!(" {}", format!("({})", group).green()));
        }
        if task.background {
            line.push_str(&format!(" {}", "background".cyan()));
        }
        println!("{}", line);

        if let Some(detail) = &task.detail {
            println!("  {}", detail.dimmed());
        }
        if !task.dependencies.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), task.dependencies.join(", "));
        }
    }

    Ok(())
}

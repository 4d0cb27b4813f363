use anyhow::Result;
use colored::*;
use vstask_core::execution::DependsOrder;
use vstask_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager, label: &str) -> Result<()> {
    println!("{} {}", "Execution plan for".bold(), label.cyan());

    let result = manager
        .get_execution_plan(label)
        .map_err(|e| anyhow::anyhow!("Failed to get execution plan: {}", e))?;

    println!("\n{}:", "Execution order".bold());
    for (i, step) in result.plan.steps.iter().enumerate() {
        let color = result.task_colors[&step.label];
        let mut line = format!(
            "  {:>3}. {}{}",
            i + 1,
            "  ".repeat(step.depth),
            step.label.color(color)
        );
        match step.order {
            Some(DependsOrder::Parallel) => {
                line.push_str(&format!(" {}", "(parallel)".dimmed()));
            }
            Some(DependsOrder::Sequence) => {
                line.push_str(&format!(" {}", "(sequence)".dimmed()));
            }
            None => {}
        }
        if step.background {
            line.push_str(&format!(" {}", "waits for ready".cyan()));
        }
        println!("{}", line);
    }

    Ok(())
}

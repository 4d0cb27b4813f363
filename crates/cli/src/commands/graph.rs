use std::collections::HashSet;

use anyhow::Result;
use colored::*;
use vstask_core::tasks::get_task_color;
use vstask_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager) -> Result<()> {
    println!("{}", "Task Dependency Graph:".bold().underline());

    let result = manager.get_dependency_graph();
    let Some(graph) = result.graph.as_ref() else {
        println!("No dependency graph available");
        return Ok(());
    };
    if graph.node_count() == 0 {
        println!("  {}", "No tasks found".dimmed());
        return Ok(());
    }

    let in_cycle: HashSet<&str> = result.cycles.iter().flatten().map(String::as_str).collect();

    for node in graph.node_indices() {
        let label = graph[node].as_str();
        let mut heading = label.color(get_task_color(label)).bold().to_string();
        if in_cycle.contains(label) {
            heading.push_str(&format!(" {}", "(cycle)".red()));
        }
        println!("{}", heading);

        // Edges come back newest first; show them in declaration order.
        let mut deps: Vec<String> = graph
            .neighbors(node)
            .map(|dep| graph[dep].clone())
            .collect();
        deps.reverse();
        deps.extend(
            result
                .missing
                .iter()
                .filter(|(task, _)| task == label)
                .map(|(_, dep)| format!("{} {}", dep, "(missing)".yellow())),
        );

        if deps.is_empty() {
            println!("  {}", "no dependencies".dimmed());
        } else {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        }
    }

    for cycle in &result.cycles {
        let mut path = cycle.clone();
        path.extend(cycle.first().cloned());
        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("circular dependency: {}", path.join(" -> ")).yellow()
        );
    }
    if !result.missing.is_empty() {
        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("{} dependency reference(s) to unknown tasks", result.missing.len()).yellow()
        );
    }

    Ok(())
}

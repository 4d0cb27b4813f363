//! Task lookup and label colors
//!
//! Tasks are addressed by label everywhere. When a file repeats a label the
//! later definition replaces the earlier one.

use std::collections::HashMap;

use colored::*;

use crate::configs::tasks::TaskConfig;

/// Index tasks by label; the last definition of a label wins.
pub fn index_by_label(tasks: Vec<TaskConfig>) -> HashMap<String, TaskConfig> {
    let mut index = HashMap::with_capacity(tasks.len());
    for task in tasks {
        index.insert(task.label.clone(), task);
    }
    index
}

/// Labels in file order with later duplicates folded into the first position.
pub fn ordered_labels(tasks: &[TaskConfig]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tasks
        .iter()
        .filter(|task| seen.insert(task.label.as_str()))
        .map(|task| task.label.clone())
        .collect()
}

/// Stable color for a task label in progress output.
pub fn get_task_color(label: &str) -> Color {
    let hash = label
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

    // Label colors stay clear of the red/green used for failure and success.
    const PALETTE: [(u8, u8, u8); 6] = [
        (147, 112, 219),
        (64, 224, 208),
        (255, 140, 0),
        (199, 21, 133),
        (72, 209, 204),
        (138, 43, 226),
    ];

    let (r, g, b) = PALETTE[(hash % PALETTE.len() as u64) as usize];
    Color::TrueColor { r, g, b }
}

/// Color per label, for callers rendering several tasks at once.
pub fn task_colors<'a>(labels: impl IntoIterator<Item = &'a str>) -> HashMap<String, Color> {
    labels
        .into_iter()
        .map(|label| (label.to_string(), get_task_color(label)))
        .collect()
}

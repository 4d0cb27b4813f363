//! Project root discovery and the task dependency graph

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::algo::kosaraju_scc;
use petgraph::prelude::*;

use crate::configs::tasks::TaskConfig;
use crate::tasks::{index_by_label, ordered_labels};
use crate::types::{VstaskError, VstaskResult};

/// Directory that marks a project root.
pub const VSCODE_DIR: &str = ".vscode";
pub const TASKS_FILE: &str = "tasks.json";

/// A project root with its tasks and their dependency graph.
#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub tasks: Vec<TaskConfig>,
    /// Edges point from a task to the tasks it depends on.
    pub dep_graph: Option<petgraph::Graph<String, ()>>,
    pub dependency_cycles: Vec<Vec<String>>,
    /// `(task, dependency)` pairs naming labels that do not exist.
    pub missing_dependencies: Vec<(String, String)>,
}

impl Workspace {
    pub fn new(root: PathBuf, tasks: Vec<TaskConfig>) -> Self {
        Self {
            root,
            tasks,
            dep_graph: None,
            dependency_cycles: Vec::new(),
            missing_dependencies: Vec::new(),
        }
    }

    pub fn tasks_file(&self) -> PathBuf {
        tasks_file_path(&self.root)
    }
}

/// Walk up from `start` to the first directory holding `.vscode` and return
/// it with symlinks resolved.
pub fn find_project_root(start: &Path) -> VstaskResult<PathBuf> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    let mut current = start.as_path();
    loop {
        if current.join(VSCODE_DIR).exists() {
            return Ok(current.canonicalize()?);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(VstaskError::Workspace(format!(
                    "no project root found from {}",
                    start.display()
                )))
            }
        }
    }
}

pub fn tasks_file_path(root: &Path) -> PathBuf {
    root.join(VSCODE_DIR).join(TASKS_FILE)
}

/// Build the dependency graph of the workspace tasks. Unknown dependency
/// labels are recorded rather than rejected so the graph can still be shown.
pub fn build_dependency_graph(workspace: &mut Workspace) {
    let mut graph = DiGraph::<String, ()>::new();
    let mut node_indices = HashMap::new();

    let labels = ordered_labels(&workspace.tasks);
    for label in &labels {
        node_indices.insert(label.clone(), graph.add_node(label.clone()));
    }

    let index = index_by_label(workspace.tasks.clone());
    let mut missing = Vec::new();
    for label in &labels {
        let from_node = node_indices[label];
        for dep in index[label].dependency_labels() {
            match node_indices.get(dep) {
                Some(&to_node) => {
                    graph.update_edge(from_node, to_node, ());
                }
                None => missing.push((label.clone(), dep.clone())),
            }
        }
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut cycle: Vec<String> = component.iter().map(|node| graph[*node].clone()).collect();
            cycle.sort();
            cycle
        })
        .collect();
    cycles.sort();

    workspace.dependency_cycles = cycles;
    workspace.missing_dependencies = missing;
    workspace.dep_graph = Some(graph);
}

//! Built-in `${name}` variable substitution
//!
//! The variable set mirrors the editor's predefined task variables that make
//! sense outside the editor: workspace folder and base name, user home, the
//! effective cwd, path separators, the editor executable and the label of the
//! default build task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::configs::tasks::TaskConfig;
use crate::platform::Platform;

/// Run-wide values the per-task variable maps are built from.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub workspace_root: PathBuf,
    pub user_home: Option<PathBuf>,
    pub exec_path: Option<String>,
    pub default_build_task: Option<String>,
    pub path_separator: String,
}

impl VariableContext {
    /// Collect the context for a workspace, probing the environment for the
    /// home directory and the editor executable.
    pub fn detect(workspace_root: &Path, tasks: &[TaskConfig]) -> Self {
        let exec_path = std::env::var("VSCODE_EXEC_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                which::which("code")
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            });

        Self {
            workspace_root: workspace_root.to_path_buf(),
            user_home: dirs::home_dir(),
            exec_path,
            default_build_task: default_build_task(tasks),
            path_separator: Platform::current().path_separator().to_string(),
        }
    }

    /// Variable map with `${cwd}` bound to `cwd`.
    pub fn variables(&self, cwd: &Path) -> VariableMap {
        let mut vars = HashMap::new();

        if let Some(home) = &self.user_home {
            vars.insert("userHome".to_string(), path_string(home));
        }
        if !self.workspace_root.as_os_str().is_empty() {
            vars.insert(
                "workspaceFolder".to_string(),
                path_string(&self.workspace_root),
            );
            if let Some(base) = self.workspace_root.file_name() {
                vars.insert(
                    "workspaceFolderBasename".to_string(),
                    base.to_string_lossy().into_owned(),
                );
            }
        }
        if !cwd.as_os_str().is_empty() {
            vars.insert("cwd".to_string(), path_string(cwd));
        }
        if let Some(exec_path) = &self.exec_path {
            vars.insert("execPath".to_string(), exec_path.clone());
        }
        if let Some(label) = &self.default_build_task {
            vars.insert("defaultBuildTask".to_string(), label.clone());
        }
        vars.insert("pathSeparator".to_string(), self.path_separator.clone());
        vars.insert("/".to_string(), self.path_separator.clone());

        VariableMap(vars)
    }
}

/// Resolved `${name}` values for one task execution.
#[derive(Debug, Clone, Default)]
pub struct VariableMap(HashMap<String, String>);

impl VariableMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Replace every `${name}` with a known value in a single pass. Unknown
    /// names stay literal and substituted values are never re-expanded.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.0.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn default_build_task(tasks: &[TaskConfig]) -> Option<String> {
    tasks
        .iter()
        .find(|t| t.is_default_build())
        .map(|t| t.label.clone())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;

    fn context(root: &str) -> VariableContext {
        VariableContext {
            workspace_root: PathBuf::from(root),
            user_home: Some(PathBuf::from("/home/me")),
            exec_path: None,
            default_build_task: Some("compile".into()),
            path_separator: "/".into(),
        }
    }

    #[test]
    fn test_variable_map_with_cwd() {
        let vars = context("/w/ws").variables(Path::new("/w/ws/sub"));
        assert_eq!(vars.get("workspaceFolder"), Some("/w/ws"));
        assert_eq!(vars.get("workspaceFolderBasename"), Some("ws"));
        assert_eq!(vars.get("cwd"), Some("/w/ws/sub"));
        assert_eq!(vars.get("pathSeparator"), Some("/"));
        assert_eq!(vars.get("/"), Some("/"));
        assert_eq!(vars.get("defaultBuildTask"), Some("compile"));
        assert_eq!(vars.get("execPath"), None);
    }

    #[test]
    fn test_substitute_simple() {
        let vars = context("/w/s").variables(Path::new("/w/s/app"));
        let out = vars.substitute("cd ${cwd} && echo ${workspaceFolder} ${userHome}");
        assert_eq!(out, "cd /w/s/app && echo /w/s /home/me");
    }

    #[test]
    fn test_unknown_and_unterminated_tokens_stay_literal() {
        let vars = context("/w").variables(Path::new("/w"));
        assert_eq!(
            vars.substitute("${nope} ${input:x} ${cwd}${/}a ${unterminated"),
            "${nope} ${input:x} /w/a ${unterminated"
        );
        assert_eq!(vars.substitute(""), "");
    }

    #[test]
    fn test_substituted_values_are_not_reexpanded() {
        let mut ctx = context("/w");
        ctx.user_home = Some(PathBuf::from("/odd/${cwd}"));
        let vars = ctx.variables(Path::new("/w/c"));
        assert_eq!(vars.substitute("${userHome}"), "/odd/${cwd}");
    }

    #[test]
    fn test_detect_finds_default_build_task() {
        let config = parse_tasks_config(
            r#"{ "tasks": [
                { "label": "lint", "group": "build" },
                { "label": "compile", "group": { "kind": "build", "isDefault": true } }
            ] }"#,
        )
        .unwrap();
        let ctx = VariableContext::detect(Path::new("/w"), &config.tasks);
        assert_eq!(ctx.default_build_task.as_deref(), Some("compile"));
    }
}

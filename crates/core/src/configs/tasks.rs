use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::configs::jsonc::normalize_jsonc;
use crate::types::{VstaskError, VstaskResult};

/// Root of `.vscode/tasks.json`
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TasksFileConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub command: Option<String>,
    pub script: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub windows: Option<PlatformTaskConfig>,
    pub osx: Option<PlatformTaskConfig>,
    pub linux: Option<PlatformTaskConfig>,
    pub options: Option<TaskOptions>,
    pub presentation: Option<Presentation>,
    #[serde(default)]
    pub is_background: bool,
    pub depends_on: Option<DependsOn>,
    pub depends_order: Option<String>,
    pub group: Option<TaskGroup>,
    pub problem_matcher: Option<ProblemMatcher>,
    pub detail: Option<String>,
}

impl TaskConfig {
    /// Labels this task depends on, in declaration order.
    pub fn dependency_labels(&self) -> &[String] {
        match &self.depends_on {
            Some(depends_on) => depends_on.labels(),
            None => &[],
        }
    }

    pub fn is_default_build(&self) -> bool {
        self.group
            .as_ref()
            .is_some_and(|g| g.kind().eq_ignore_ascii_case("build") && g.is_default())
    }
}

/// Per-OS override block (`windows`, `osx`, `linux`).
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlatformTaskConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub options: Option<TaskOptions>,
    pub presentation: Option<Presentation>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub shell: Option<ShellOptions>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ShellOptions {
    pub executable: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub reveal: Option<String>,
    pub panel: Option<String>,
    #[serde(default)]
    pub focus: bool,
    #[serde(default)]
    pub echo: bool,
    #[serde(default)]
    pub show_reuse_message: bool,
    #[serde(default)]
    pub clear: bool,
}

/// `dependsOn`: a label, a list of labels, or `{ "tasks": [...] }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DependsOn {
    Single(String),
    Multiple(Vec<String>),
    Object { tasks: Vec<String> },
}

impl DependsOn {
    pub fn labels(&self) -> &[String] {
        match self {
            DependsOn::Single(label) if label.is_empty() => &[],
            DependsOn::Single(label) => std::slice::from_ref(label),
            DependsOn::Multiple(labels) | DependsOn::Object { tasks: labels } => labels,
        }
    }
}

/// `group`: `"build"` or `{ "kind": "build", "isDefault": true }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaskGroup {
    Kind(String),
    Detailed {
        kind: String,
        #[serde(default, rename = "isDefault")]
        is_default: bool,
    },
}

impl TaskGroup {
    pub fn kind(&self) -> &str {
        match self {
            TaskGroup::Kind(kind) | TaskGroup::Detailed { kind, .. } => kind,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, TaskGroup::Detailed { is_default: true, .. })
    }
}

/// `problemMatcher`: string | object | array of either.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProblemMatcher {
    Many(Vec<ProblemMatcherEntry>),
    One(ProblemMatcherEntry),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProblemMatcherEntry {
    Named(String),
    Object(ProblemMatcherObject),
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemMatcherObject {
    pub owner: Option<String>,
    pub source: Option<String>,
    pub severity: Option<String>,
    pub background: Option<BackgroundConfig>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    #[serde(default)]
    pub active_on_start: bool,
    #[serde(default)]
    pub begins_pattern: String,
    #[serde(default)]
    pub ends_pattern: String,
}

impl ProblemMatcher {
    pub fn entries(&self) -> &[ProblemMatcherEntry] {
        match self {
            ProblemMatcher::Many(entries) => entries,
            ProblemMatcher::One(entry) => std::slice::from_ref(entry),
        }
    }

    /// First usable background block: object matchers win over known aliases.
    pub fn first_background(&self) -> Option<BackgroundConfig> {
        let from_objects = self.entries().iter().find_map(|entry| match entry {
            ProblemMatcherEntry::Object(ProblemMatcherObject {
                background: Some(bg),
                ..
            }) => {
                let bg = BackgroundConfig {
                    active_on_start: bg.active_on_start,
                    begins_pattern: bg.begins_pattern.trim().to_string(),
                    ends_pattern: bg.ends_pattern.trim().to_string(),
                };
                (bg.active_on_start || !bg.begins_pattern.is_empty()).then_some(bg)
            }
            _ => None,
        });

        from_objects.or_else(|| {
            self.entries().iter().find_map(|entry| match entry {
                ProblemMatcherEntry::Named(name) => builtin_background(name.trim()),
                ProblemMatcherEntry::Object(_) => None,
            })
        })
    }
}

/// Background blocks for string matchers whose readiness lines are well known.
fn builtin_background(alias: &str) -> Option<BackgroundConfig> {
    match alias {
        "$tsc-watch" => Some(BackgroundConfig {
            active_on_start: false,
            begins_pattern:
                r"(?i)\bwatch(ing)? for file changes\b|^Starting compilation in watch mode"
                    .to_string(),
            ends_pattern: String::new(),
        }),
        _ => None,
    }
}

/// Entry of the `inputs` array.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub id: String,
    #[serde(rename = "type", default)]
    pub input_type: String,
    pub description: Option<String>,
    pub default: Option<String>,
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub options: Vec<PickOption>,
    pub command: Option<String>,
}

/// Supported input kinds; anything unrecognised prompts for free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PromptString { masked: bool },
    PickString,
    Command,
    Unknown,
}

impl InputConfig {
    pub fn kind(&self) -> InputKind {
        match self.input_type.to_lowercase().as_str() {
            "promptstring" => InputKind::PromptString {
                masked: self.password,
            },
            "pickstring" => InputKind::PickString,
            "command" => InputKind::Command,
            _ => InputKind::Unknown,
        }
    }

    /// Non-empty prompt label.
    pub fn prompt_label(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => format!("Enter {}", self.id),
        }
    }
}

/// A `pickString` option: a bare value or `{ "label": ..., "value": ... }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PickOption {
    Value(String),
    Labeled { label: Option<String>, value: String },
}

impl PickOption {
    pub fn value(&self) -> &str {
        match self {
            PickOption::Value(value) | PickOption::Labeled { value, .. } => value,
        }
    }

    pub fn display(&self) -> &str {
        match self {
            PickOption::Labeled {
                label: Some(label), ..
            } => label,
            other => other.value(),
        }
    }
}

pub fn parse_tasks_config(jsonc_str: &str) -> VstaskResult<TasksFileConfig> {
    let json = normalize_jsonc(jsonc_str);
    let config: TasksFileConfig = serde_json::from_str(&json)?;
    Ok(config)
}

pub fn load_tasks_file(path: &Path) -> VstaskResult<TasksFileConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        VstaskError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_tasks_config(&content).map_err(|e| {
        VstaskError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })
}

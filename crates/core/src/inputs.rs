//! `${input:id}` resolution
//!
//! Inputs are resolved at most once per run. The cache is shared by every
//! task of the run, including parallel dependency branches, and the lock is
//! held while a value is being resolved so two branches asking for the same
//! id never prompt (or run the input's shell command) twice.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::configs::tasks::{InputConfig, InputKind, TaskConfig};
use crate::platform::Platform;
use crate::types::{VstaskError, VstaskResult};

/// Prefix of environment variables that pre-answer inputs.
pub const INPUT_ENV_PREFIX: &str = "VSTASK_INPUT_";

fn input_token() -> &'static Regex {
    static INPUT_TOKEN: OnceLock<Regex> = OnceLock::new();
    INPUT_TOKEN.get_or_init(|| {
        Regex::new(r"\$\{input:([^}]+)\}").unwrap_or_else(|_| unreachable!("literal pattern"))
    })
}

/// Interactive value sources. Calls block; the resolver runs them on the
/// blocking pool.
pub trait Prompter: Send + Sync {
    /// Free-text prompt, `default` returned when the answer is empty.
    fn text(&self, label: &str, default: Option<&str>) -> VstaskResult<String>;
    /// Masked free-text prompt.
    fn password(&self, label: &str) -> VstaskResult<String>;
    /// Single choice; returns the index into `items`.
    fn select(&self, label: &str, items: &[String], default: usize) -> VstaskResult<usize>;
    /// Plain line prompt for ids without a definition.
    fn line(&self, label: &str) -> VstaskResult<String>;
}

/// Terminal prompts backed by dialoguer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&self, label: &str, default: Option<&str>) -> VstaskResult<String> {
        let mut input = dialoguer::Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true);
        if let Some(default) = default.filter(|d| !d.is_empty()) {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .map_err(|e| VstaskError::Prompt(e.to_string()))
    }

    fn password(&self, label: &str) -> VstaskResult<String> {
        dialoguer::Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| VstaskError::Prompt(e.to_string()))
    }

    fn select(&self, label: &str, items: &[String], default: usize) -> VstaskResult<usize> {
        dialoguer::Select::new()
            .with_prompt(label)
            .items(items)
            .default(default)
            .max_length(8)
            .interact()
            .map_err(|e| VstaskError::Prompt(e.to_string()))
    }

    fn line(&self, label: &str) -> VstaskResult<String> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}: ", label)?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Collect `VSTASK_INPUT_*` overrides, keyed by the uppercased input id.
pub fn input_overrides_from_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| {
            let (key, value) = (key.into_string().ok()?, value.into_string().ok()?);
            let id = key.strip_prefix(INPUT_ENV_PREFIX)?;
            (!value.is_empty()).then(|| (id.to_string(), value))
        })
        .collect()
}

/// Resolves and caches input values for one run.
pub struct InputResolver {
    definitions: HashMap<String, InputConfig>,
    overrides: HashMap<String, String>,
    prompter: Arc<dyn Prompter>,
    platform: Platform,
    cache: Mutex<HashMap<String, String>>,
}

impl InputResolver {
    pub fn new(
        inputs: Vec<InputConfig>,
        overrides: HashMap<String, String>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            definitions: inputs.into_iter().map(|i| (i.id.clone(), i)).collect(),
            overrides,
            prompter,
            platform: Platform::current(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve every id in `ids`, returning their values.
    pub async fn resolve_all(&self, ids: &[String]) -> VstaskResult<HashMap<String, String>> {
        let mut values = HashMap::with_capacity(ids.len());
        for id in ids {
            let value = self.resolve(id).await?;
            values.insert(id.clone(), value);
        }
        Ok(values)
    }

    /// Value for `id`, resolving it on first use.
    pub async fn resolve(&self, id: &str) -> VstaskResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(value) = cache.get(id) {
            return Ok(value.clone());
        }

        let value = self.resolve_uncached(id).await?;
        cache.insert(id.to_string(), value.clone());
        Ok(value)
    }

    async fn resolve_uncached(&self, id: &str) -> VstaskResult<String> {
        if let Some(value) = self.overrides.get(&id.to_uppercase()) {
            debug!(input = id, "input answered from environment");
            return Ok(value.clone());
        }

        let Some(input) = self.definitions.get(id) else {
            let label = format!("Enter value for {}", id);
            return self.prompt(move |p| p.line(&label)).await;
        };

        match input.kind() {
            InputKind::PromptString { masked } => self.prompt_text(input, masked).await,
            InputKind::PickString if input.options.is_empty() => {
                self.prompt_text(input, false).await
            }
            InputKind::PickString => {
                let items: Vec<String> = input
                    .options
                    .iter()
                    .map(|o| o.display().to_string())
                    .collect();
                let default = input
                    .default
                    .as_deref()
                    .and_then(|d| input.options.iter().position(|o| o.value() == d))
                    .unwrap_or(0);
                let label = input
                    .description
                    .clone()
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| format!("Select {}", input.id));
                let index = self
                    .prompt(move |p| p.select(&label, &items, default))
                    .await?;
                input
                    .options
                    .get(index)
                    .map(|o| o.value().to_string())
                    .ok_or_else(|| VstaskError::Prompt(format!("invalid choice for {}", id)))
            }
            InputKind::Command => {
                let output = match input.command.as_deref() {
                    Some(script) => self.run_input_command(script).await,
                    None => String::new(),
                };
                let output = output.trim();
                if !output.is_empty() {
                    return Ok(output.to_string());
                }
                if let Some(default) = input.default.as_ref().filter(|d| !d.is_empty()) {
                    return Ok(default.clone());
                }
                let label = input.prompt_label();
                self.prompt(move |p| p.text(&label, None)).await
            }
            InputKind::Unknown => self.prompt_text(input, false).await,
        }
    }

    async fn prompt_text(&self, input: &InputConfig, masked: bool) -> VstaskResult<String> {
        let label = input.prompt_label();
        let default = input.default.clone();
        if masked {
            let answer = self.prompt(move |p| p.password(&label)).await?;
            return Ok(match default {
                Some(default) if answer.is_empty() => default,
                _ => answer,
            });
        }
        self.prompt(move |p| p.text(&label, default.as_deref()))
            .await
    }

    async fn prompt<F, T>(&self, ask: F) -> VstaskResult<T>
    where
        F: FnOnce(&dyn Prompter) -> VstaskResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let prompter = Arc::clone(&self.prompter);
        tokio::task::spawn_blocking(move || ask(prompter.as_ref()))
            .await
            .map_err(|e| VstaskError::Prompt(e.to_string()))?
    }

    /// Stdout of the input's shell command; empty on any failure.
    async fn run_input_command(&self, script: &str) -> String {
        if script.trim().is_empty() {
            return String::new();
        }
        let (shell, flags) = self.platform.default_shell();
        let output = tokio::process::Command::new(shell)
            .args(flags)
            .arg(script)
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                warn!(command = script, status = %output.status, "input command failed");
                String::new()
            }
            Err(err) => {
                warn!(command = script, error = %err, "input command could not start");
                String::new()
            }
        }
    }
}

/// Distinct input ids referenced by the task's command, args, cwd and env
/// values, in first-appearance order.
pub fn collect_input_refs(task: &TaskConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    let options = task.options.as_ref();
    let sources = task
        .command
        .iter()
        .chain(task.args.iter())
        .chain(options.and_then(|o| o.cwd.as_ref()))
        .chain(options.into_iter().flat_map(|o| o.env.values()));

    for source in sources {
        for captures in input_token().captures_iter(source) {
            let id = captures[1].to_string();
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Replace `${input:id}` tokens with already-resolved values. Ids missing
/// from `values` are left as-is.
pub fn replace_inputs(input: &str, values: &HashMap<String, String>) -> String {
    if input.is_empty() {
        return String::new();
    }
    input_token()
        .replace_all(input, |captures: &regex::Captures| {
            values
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

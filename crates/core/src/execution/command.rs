//! Command construction
//!
//! Turns an effective, fully substituted task into a [`BuiltCommand`]: the
//! program, its argv, the working directory and the complete environment the
//! child starts with. Shell tasks are collapsed into a single command line for
//! the configured shell, process tasks are passed through, and npm-style tasks
//! are mapped onto the workspace's package manager.

use std::path::{Path, PathBuf};

use crate::configs::settings::{
    resolve_package_manager, user_settings_candidates, DEFAULT_PACKAGE_MANAGER,
};
use crate::configs::tasks::TaskConfig;
use crate::platform::Platform;
use crate::types::{VstaskError, VstaskResult};

/// Plain POSIX shell used when a bash-family shell cannot be started.
pub const POSIX_SHELL: &str = "/bin/sh";

const POSIX_SPECIAL: &[char] = &[
    ' ', '\t', '\n', '\r', ';', '&', '|', '(', ')', '<', '>', '[', ']', '{', '}', '*', '?', '!',
    '~', '`', '$', '\\', '"', '\'',
];

const WINDOWS_SPECIAL: &[char] = &['"', '^', '&', '|', '<', '>', '(', ')', '%', '!'];

const NPM_BUILTINS: &[&str] = &[
    "install",
    "ci",
    "publish",
    "pack",
    "update",
    "outdated",
    "rebuild",
    "version",
    "login",
    "logout",
    "whoami",
    "init",
    "create",
    "audit",
    "prune",
    "cache",
    "config",
    "root",
    "help",
    "search",
    "exec",
    "add",
    "remove",
    "link",
    "unlink",
    "run",
    "run-script",
];

/// An invocable command. The environment is the complete child environment,
/// not a delta over the parent's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl BuiltCommand {
    /// Whether the program is a bash-family shell.
    pub fn is_bash(&self) -> bool {
        Path::new(&self.program)
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| name.ends_with("bash") || name.ends_with("bash.exe"))
    }

    /// Same command with the program swapped for [`POSIX_SHELL`].
    pub fn with_posix_shell(&self) -> Self {
        Self {
            program: POSIX_SHELL.to_string(),
            ..self.clone()
        }
    }

    /// Program and arguments joined for log output.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }

    pub fn to_pty(&self) -> portable_pty::CommandBuilder {
        let mut command = portable_pty::CommandBuilder::new(&self.program);
        command.args(&self.args);
        command.cwd(&self.cwd);
        command.env_clear();
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Shell,
    Process,
    PackageManager,
}

impl TaskKind {
    fn parse(task_type: Option<&str>) -> VstaskResult<Self> {
        let raw = task_type.unwrap_or_default();
        match raw.trim().to_lowercase().as_str() {
            "" | "shell" => Ok(TaskKind::Shell),
            "process" => Ok(TaskKind::Process),
            "npm" => Ok(TaskKind::PackageManager),
            _ => Err(VstaskError::UnsupportedTaskType(raw.to_string())),
        }
    }
}

/// Builds commands for one platform.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    platform: Platform,
    user_settings: Vec<PathBuf>,
    default_package_manager: String,
}

impl CommandBuilder {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            user_settings: user_settings_candidates(platform),
            default_package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
        }
    }

    /// Replace the user-level settings files consulted for the package manager.
    pub fn with_user_settings(mut self, user_settings: Vec<PathBuf>) -> Self {
        self.user_settings = user_settings;
        self
    }

    pub fn build(
        &self,
        task: &TaskConfig,
        cwd: &Path,
        env: Vec<(String, String)>,
    ) -> VstaskResult<BuiltCommand> {
        let command = task.command.as_deref().unwrap_or_default();

        let (program, args) = match TaskKind::parse(task.task_type.as_deref())? {
            TaskKind::Process => {
                if command.is_empty() {
                    return Err(VstaskError::EmptyCommand);
                }
                (command.to_string(), task.args.clone())
            }
            TaskKind::Shell => {
                let (default_exe, default_flags) = self.platform.default_shell();
                let shell = task.options.as_ref().and_then(|o| o.shell.as_ref());

                let (program, mut args) = match shell {
                    Some(shell) if shell.executable.as_deref().is_some_and(|e| !e.is_empty()) => {
                        let flags = if shell.args.is_empty() {
                            default_flags.iter().map(|f| f.to_string()).collect()
                        } else {
                            shell.args.clone()
                        };
                        (shell.executable.clone().unwrap_or_default(), flags)
                    }
                    _ => (
                        default_exe.to_string(),
                        default_flags.iter().map(|f| f.to_string()).collect(),
                    ),
                };
                args.push(build_command_line(self.platform, command, &task.args));
                (program, args)
            }
            TaskKind::PackageManager => {
                let pm = resolve_package_manager(
                    cwd,
                    &self.user_settings,
                    &self.default_package_manager,
                );
                (pm, package_manager_args(task)?)
            }
        };

        Ok(BuiltCommand {
            program,
            args,
            cwd: cwd.to_path_buf(),
            env,
        })
    }
}

fn package_manager_args(task: &TaskConfig) -> VstaskResult<Vec<String>> {
    if let Some(script) = task.script.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(run_script(script, &task.args));
    }

    let command = task.command.as_deref().map(str::trim).unwrap_or_default();
    let (name, rest) = if command.is_empty() {
        match task.args.split_first() {
            Some((first, rest)) => (first.as_str(), rest),
            None => return Err(VstaskError::MissingPackageCommand),
        }
    } else {
        (command, task.args.as_slice())
    };

    match name {
        "run" | "run-script" => match rest.split_first() {
            Some((script, script_args)) => Ok(run_script(script, script_args)),
            None => Err(VstaskError::MissingScriptName),
        },
        builtin if is_npm_builtin(builtin) => Ok(std::iter::once(builtin.to_string())
            .chain(rest.iter().cloned())
            .collect()),
        script => Ok(run_script(script, rest)),
    }
}

/// `run <script> [-- args...]`
fn run_script(script: &str, args: &[String]) -> Vec<String> {
    let mut out = vec!["run".to_string(), script.to_string()];
    if !args.is_empty() {
        out.push("--".to_string());
        out.extend(args.iter().cloned());
    }
    out
}

pub fn is_npm_builtin(command: &str) -> bool {
    NPM_BUILTINS.contains(&command)
}

/// Single command line for the platform shell. The command is kept verbatim
/// so pipes and substitutions still work; only arguments are quoted.
pub fn build_command_line(platform: Platform, command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }

    let quote: fn(&str) -> String = match platform {
        Platform::Windows => windows_quote,
        _ => posix_quote,
    };

    let mut line = command.to_string();
    for arg in args {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&quote(arg));
    }
    line
}

/// Double-quote `arg` for a POSIX shell when it carries whitespace or
/// metacharacters. `$` stays live inside the quotes.
pub fn posix_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if !arg.contains(POSIX_SPECIAL) {
        return arg.to_string();
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Quote `arg` for `cmd.exe`: inner double quotes are doubled.
pub fn windows_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    let needs_quotes = arg
        .chars()
        .any(|c| c <= ' ' || WINDOWS_SPECIAL.contains(&c));
    if !needs_quotes {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\"\""))
}

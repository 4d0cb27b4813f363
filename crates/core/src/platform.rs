//! Platform detection and per-OS task overrides

use std::env;

use crate::configs::tasks::{PlatformTaskConfig, TaskConfig};

/// Operating system families that tasks.json can override for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    /// Detect the current platform
    pub fn current() -> Self {
        Self::from_os(env::consts::OS)
    }

    /// Create platform info from an OS string as reported by `std::env::consts::OS`
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }

    /// Default shell executable and the flag that makes it run a command line.
    pub fn default_shell(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Platform::Windows => ("cmd.exe", &["/C"]),
            _ => ("/bin/sh", &["-c"]),
        }
    }

    pub fn path_separator(self) -> &'static str {
        match self {
            Platform::Windows => "\\",
            _ => "/",
        }
    }

    fn override_block(self, task: &TaskConfig) -> Option<&PlatformTaskConfig> {
        match self {
            Platform::Windows => task.windows.as_ref(),
            Platform::MacOs => task.osx.as_ref(),
            Platform::Linux => task.linux.as_ref(),
            Platform::Other => None,
        }
    }
}

/// Derive the effective task for `platform`. The input task is left untouched.
pub fn effective_task(task: &TaskConfig, platform: Platform) -> TaskConfig {
    let mut effective = task.clone();
    let Some(block) = platform.override_block(task) else {
        return effective;
    };

    if let Some(command) = block.command.as_ref().filter(|c| !c.is_empty()) {
        effective.command = Some(command.clone());
    }
    if let Some(args) = &block.args {
        effective.args = args.clone();
    }
    if let Some(options) = &block.options {
        effective.options = Some(options.clone());
    }
    if let Some(presentation) = &block.presentation {
        effective.presentation = Some(presentation.clone());
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;

    fn sample_task() -> TaskConfig {
        parse_tasks_config(
            r#"{ "tasks": [ {
                "label": "build",
                "command": "make",
                "args": ["all"],
                "options": { "cwd": "src" },
                "windows": { "command": "nmake", "args": [] },
                "osx": { "command": "", "options": { "cwd": "mac" } },
                "linux": { "args": ["linux-all"] }
            } ] }"#,
        )
        .unwrap()
        .tasks
        .remove(0)
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other);
    }

    #[test]
    fn test_windows_override_replaces_command_and_args() {
        let task = sample_task();
        let effective = effective_task(&task, Platform::Windows);
        assert_eq!(effective.command.as_deref(), Some("nmake"));
        assert!(effective.args.is_empty());
        // original untouched
        assert_eq!(task.command.as_deref(), Some("make"));
        assert_eq!(task.args, ["all"]);
    }

    #[test]
    fn test_empty_override_command_keeps_base_command() {
        let effective = effective_task(&sample_task(), Platform::MacOs);
        assert_eq!(effective.command.as_deref(), Some("make"));
        assert_eq!(
            effective.options.and_then(|o| o.cwd).as_deref(),
            Some("mac")
        );
    }

    #[test]
    fn test_linux_override_and_other_platform() {
        let effective = effective_task(&sample_task(), Platform::Linux);
        assert_eq!(effective.args, ["linux-all"]);
        assert_eq!(effective.command.as_deref(), Some("make"));

        let other = effective_task(&sample_task(), Platform::Other);
        assert_eq!(other.args, ["all"]);
    }

    #[test]
    fn test_default_shells() {
        assert_eq!(Platform::Windows.default_shell(), ("cmd.exe", &["/C"][..]));
        assert_eq!(Platform::Linux.default_shell().1, ["-c"]);
    }
}

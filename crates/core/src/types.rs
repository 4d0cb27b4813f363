use std::io;

use thiserror::Error;

/// The main error type for vstask operations
#[derive(Debug, Error)]
pub enum VstaskError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("task {0:?} not found")]
    TaskNotFound(String),

    #[error("dependsOn: task {0:?} not found")]
    MissingDependency(String),

    #[error("cycle detected at {0:?}")]
    DependencyCycle(String),

    #[error("dependency {label:?} failed: {source}")]
    DependencyFailed {
        label: String,
        #[source]
        source: Box<VstaskError>,
    },

    #[error("unsupported task type: {0:?}")]
    UnsupportedTaskType(String),

    #[error("process task has empty command")]
    EmptyCommand,

    #[error("npm task missing command/script")]
    MissingPackageCommand,

    #[error("npm run requires a script name")]
    MissingScriptName,

    #[error("input prompt failed: {0}")]
    Prompt(String),

    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("pseudo-terminal error: {0}")]
    Pty(String),

    /// Non-zero exit, described as `exit status N` or `signal: N`.
    #[error("{0}")]
    Exit(String),

    #[error("task aborted: {0}")]
    Aborted(String),

    #[error("killed")]
    Killed,

    #[error("cancelled")]
    Cancelled,
}

impl VstaskError {
    /// Unwraps dependency wrappers down to the error that actually occurred.
    pub fn root_cause(&self) -> &VstaskError {
        match self {
            VstaskError::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this is a start failure caused by exec policy or a missing
    /// executable, which the process runner answers with its fallback chain.
    pub fn is_exec_permission_error(&self) -> bool {
        match self {
            VstaskError::Spawn { source, .. } => is_exec_permission_error(source),
            _ => false,
        }
    }
}

pub(crate) fn is_exec_permission_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
    ) {
        return true;
    }
    err.to_string()
        .to_lowercase()
        .contains("operation not permitted")
}

/// Result type alias for vstask operations
pub type VstaskResult<T> = Result<T, VstaskError>;

//! Process lifecycle
//!
//! [`ProcessRunner`] starts a [`BuiltCommand`] under a pseudo-terminal when the
//! caller sits on a real terminal, otherwise wired to the caller's standard
//! streams. Start failures caused by exec policy walk a fallback chain before
//! they are reported:
//!
//! 1. pseudo-terminal (the child leads its own session)
//! 2. standard streams, no process group
//! 3. standard streams with `/bin/sh` in place of bash
//!
//! Without a pseudo-terminal the chain starts at standard streams inside a
//! process group. Background dependencies go through [`readiness`] instead.

pub mod control;
pub mod pty;
pub mod readiness;
pub mod signals;
pub mod stdio;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::execution::command::BuiltCommand;
use crate::types::{VstaskError, VstaskResult};

pub use control::{native_process_control, ProcessControl, ProcessTarget};
pub use readiness::BackgroundMatcher;
pub use signals::{SignalSet, TrapSignal};

/// How long a cancelled child gets to report its exit before the run is
/// reported as killed.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Pseudo-terminal usage policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PtyMode {
    /// Only when both stdin and stdout are terminals.
    #[default]
    Auto,
    Force,
    Disable,
}

impl PtyMode {
    /// `disable` wins over `force`.
    pub fn from_flags(force: bool, disable: bool) -> Self {
        match (force, disable) {
            (_, true) => PtyMode::Disable,
            (true, false) => PtyMode::Force,
            (false, false) => PtyMode::Auto,
        }
    }

    /// Read `VSTASK_FORCE_PTY=1` and `VSTASK_DISABLE_PTY=1`.
    pub fn from_env() -> Self {
        let flag = |name: &str| std::env::var(name).is_ok_and(|v| v == "1");
        Self::from_flags(flag("VSTASK_FORCE_PTY"), flag("VSTASK_DISABLE_PTY"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunnerConfig {
    pub pty: PtyMode,
}

impl ProcessRunnerConfig {
    pub fn from_env() -> Self {
        Self {
            pty: PtyMode::from_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Wait for the process to exit.
    Foreground,
    /// Return as soon as a background matcher reports readiness.
    WaitForReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited successfully.
    Exited,
    /// The process reported readiness and was left running.
    Ready,
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    control: Arc<dyn ProcessControl>,
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    pub fn new(control: Arc<dyn ProcessControl>, config: ProcessRunnerConfig) -> Self {
        Self { control, config }
    }

    pub fn native(config: ProcessRunnerConfig) -> Self {
        Self::new(native_process_control(), config)
    }

    pub fn control(&self) -> &dyn ProcessControl {
        self.control.as_ref()
    }

    fn use_pty(&self) -> bool {
        if !self.control.supports_pty() {
            return false;
        }
        match self.config.pty {
            PtyMode::Force => true,
            PtyMode::Disable => false,
            PtyMode::Auto => std::io::stdin().is_terminal() && std::io::stdout().is_terminal(),
        }
    }

    pub async fn run(
        &self,
        command: &BuiltCommand,
        matcher: Option<&BackgroundMatcher>,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> VstaskResult<RunOutcome> {
        if cancel.is_cancelled() {
            return Err(VstaskError::Cancelled);
        }
        debug!(command = %command.display_line(), cwd = %command.cwd.display(), ?mode, "starting process");

        match (matcher, mode) {
            (Some(matcher), RunMode::WaitForReady) => {
                readiness::run_until_ready(command, self.control(), matcher, cancel).await
            }
            _ => self.run_foreground(command, cancel).await,
        }
    }

    async fn run_foreground(
        &self,
        command: &BuiltCommand,
        cancel: &CancellationToken,
    ) -> VstaskResult<RunOutcome> {
        if self.use_pty() {
            match pty::spawn(command) {
                Ok(session) => return session.run(self.control(), cancel).await,
                Err(err) if err.is_exec_permission_error() => {
                    debug!(error = %err, "pty start blocked, retrying without a process group");
                    return self.run_stdio(command, false, cancel).await;
                }
                Err(err) => debug!(error = %err, "pty unavailable, using standard streams"),
            }
        }
        self.run_stdio(command, true, cancel).await
    }

    async fn run_stdio(
        &self,
        command: &BuiltCommand,
        grouped: bool,
        cancel: &CancellationToken,
    ) -> VstaskResult<RunOutcome> {
        match stdio::run(command, self.control(), grouped, cancel).await {
            Err(err) if command.is_bash() && err.is_exec_permission_error() => {
                warn!(program = %command.program, error = %err, "bash could not be started, retrying with /bin/sh");
                stdio::run(&command.with_posix_shell(), self.control(), grouped, cancel).await
            }
            other => other,
        }
    }
}

/// Map a finished child's status onto the run result.
pub(crate) fn exit_result(status: std::io::Result<std::process::ExitStatus>) -> VstaskResult<RunOutcome> {
    let status = status?;
    if status.success() {
        return Ok(RunOutcome::Exited);
    }
    Err(VstaskError::Exit(describe_exit(&status)))
}

fn describe_exit(status: &std::process::ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal: {}", signal);
        }
    }
    status.to_string()
}

pub(crate) fn spawn_error(command: &BuiltCommand, source: std::io::Error) -> VstaskError {
    VstaskError::Spawn {
        program: command.program.clone(),
        source,
    }
}

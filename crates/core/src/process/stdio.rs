//! Child wired straight to the caller's standard streams

use std::process::Stdio;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::control::{ProcessControl, ProcessTarget};
use super::{exit_result, spawn_error, RunOutcome, KILL_GRACE};
use crate::execution::command::BuiltCommand;
use crate::types::{VstaskError, VstaskResult};

/// Run `command` to completion. On cancellation the tree is terminated and
/// the child gets [`KILL_GRACE`] to exit before the run counts as killed.
pub async fn run(
    command: &BuiltCommand,
    control: &dyn ProcessControl,
    grouped: bool,
    cancel: &CancellationToken,
) -> VstaskResult<RunOutcome> {
    if cancel.is_cancelled() {
        return Err(VstaskError::Cancelled);
    }
    let mut process = command.to_tokio();
    if grouped {
        control.isolate(&mut process);
    }
    process
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = process
        .spawn()
        .map_err(|source| spawn_error(command, source))?;
    let pid = child.id();
    debug!(?pid, grouped, "process started");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Some(pid) = pid {
                control.terminate_tree(ProcessTarget { pid, grouped });
            }
            match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                Ok(status) => exit_result(status),
                Err(_) => Err(VstaskError::Killed),
            }
        }
        status = child.wait() => exit_result(status),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::process::control::{process_gone, UnixProcessControl};

    /// Ignores every graceful signal and never stops on its own.
    #[derive(Debug)]
    struct InertControl;

    impl ProcessControl for InertControl {
        fn isolate(&self, command: &mut tokio::process::Command) {
            command.process_group(0);
        }
        fn terminate_tree(&self, _target: ProcessTarget) {}
        fn supports_pty(&self) -> bool {
            false
        }
    }

    fn sh(script: String, cwd: &std::path::Path) -> BuiltCommand {
        BuiltCommand {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), script],
            cwd: cwd.to_path_buf(),
            env: std::env::vars().collect(),
        }
    }

    async fn wait_for_file(path: &std::path::Path) -> String {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if let Ok(content) = std::fs::read_to_string(path) {
                if content.ends_with('\n') {
                    return content;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never written", path.display());
    }

    #[tokio::test]
    async fn test_cancel_terminates_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let command = sh(
            format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()),
            dir.path(),
        );
        let control: Arc<dyn ProcessControl> = Arc::new(UnixProcessControl::default());
        let cancel = CancellationToken::new();

        let run = {
            let cancel = cancel.clone();
            let control = Arc::clone(&control);
            tokio::spawn(async move { run(&command, control.as_ref(), true, &cancel).await })
        };

        let grandchild: u32 = wait_for_file(&pid_file).await.trim().parse().unwrap();
        cancel.cancel();

        let result = run.await.unwrap();
        assert!(result.is_err());

        let start = Instant::now();
        while !process_gone(grandchild) && start.elapsed() < Duration::from_secs(3) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(process_gone(grandchild));
    }

    #[tokio::test]
    async fn test_unresponsive_child_is_reported_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("self.pid");
        let command = sh(
            format!("echo $$ > '{}'; exec sleep 30", pid_file.display()),
            dir.path(),
        );
        let cancel = CancellationToken::new();

        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { run(&command, &InertControl, true, &cancel).await })
        };
        let pid: i32 = wait_for_file(&pid_file).await.trim().parse().unwrap();
        cancel.cancel();

        let started = Instant::now();
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, VstaskError::Killed));
        assert!(started.elapsed() >= KILL_GRACE);

        let _ = nix::sys::signal::killpg(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGKILL,
        );
    }
}

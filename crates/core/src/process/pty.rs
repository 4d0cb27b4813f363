//! Pseudo-terminal sessions for interactive tasks
//!
//! The child gets a terminal of its own, sized like ours. While it runs the
//! local terminal is in raw mode, stdin is forwarded from a detached thread and
//! output is copied back chunk by chunk.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, MasterPty, PtySize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::control::{ProcessControl, ProcessTarget};
use super::{RunOutcome, KILL_GRACE};
use crate::execution::command::BuiltCommand;
use crate::types::{VstaskError, VstaskResult};

/// Time the output copier gets to drain after the child exits.
pub const PTY_DRAIN: Duration = Duration::from_millis(150);

type SharedMaster = Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>;

/// A child started under a pseudo-terminal, not yet waited on.
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

/// Open a pseudo-terminal and start `command` on it.
pub fn spawn(command: &BuiltCommand) -> VstaskResult<PtySession> {
    let pair = native_pty_system()
        .openpty(local_size())
        .map_err(|e| VstaskError::Pty(e.to_string()))?;
    let child = pair
        .slave
        .spawn_command(command.to_pty())
        .map_err(|e| classify_spawn_error(command, e))?;
    // Only the child keeps the slave side open, so reads hit EOF when it exits.
    drop(pair.slave);

    Ok(PtySession {
        master: pair.master,
        child,
    })
}

/// Spawn failures surface as `anyhow` errors; recover the `io::Error` when
/// there is one so the fallback chain can classify it.
fn classify_spawn_error(command: &BuiltCommand, err: anyhow::Error) -> VstaskError {
    match err.downcast::<std::io::Error>() {
        Ok(source) => super::spawn_error(command, source),
        Err(err) => {
            let message = err.to_string();
            let lower = message.to_lowercase();
            let kind = if lower.contains("doesn't exist") || lower.contains("not found") {
                Some(std::io::ErrorKind::NotFound)
            } else if lower.contains("permission denied") {
                Some(std::io::ErrorKind::PermissionDenied)
            } else {
                None
            };
            match kind {
                Some(kind) => super::spawn_error(command, std::io::Error::new(kind, message)),
                None => VstaskError::Pty(message),
            }
        }
    }
}

fn local_size() -> PtySize {
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn resize(master: &SharedMaster) {
    let Ok(guard) = master.lock() else {
        return;
    };
    if let Some(master) = guard.as_ref() {
        if let Err(err) = master.resize(local_size()) {
            debug!(error = %err, "pty resize failed");
        }
    }
}

fn close(master: &SharedMaster) {
    if let Ok(mut guard) = master.lock() {
        guard.take();
    }
}

/// Raw mode for the local terminal, restored on drop. Nested guards leave the
/// mode to the outermost one.
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        let already = crossterm::terminal::is_raw_mode_enabled().unwrap_or(false);
        let enabled = !already && crossterm::terminal::enable_raw_mode().is_ok();
        Self { enabled }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

/// Aborts the wrapped task on drop.
struct AbortOnDrop(Option<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = &self.0 {
            handle.abort();
        }
    }
}

#[cfg(unix)]
fn forward_resizes(master: SharedMaster) -> AbortOnDrop {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut winch) = signal(SignalKind::window_change()) else {
        return AbortOnDrop(None);
    };
    AbortOnDrop(Some(tokio::spawn(async move {
        while winch.recv().await.is_some() {
            resize(&master);
        }
    })))
}

#[cfg(not(unix))]
fn forward_resizes(_master: SharedMaster) -> AbortOnDrop {
    AbortOnDrop(None)
}

impl PtySession {
    /// Wire up the session and wait for the child.
    pub async fn run(
        self,
        control: &dyn ProcessControl,
        cancel: &CancellationToken,
    ) -> VstaskResult<RunOutcome> {
        let PtySession { master, mut child } = self;
        let pid = child.process_id();
        debug!(?pid, "pty process started");

        let reader = master
            .try_clone_reader()
            .map_err(|e| VstaskError::Pty(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| VstaskError::Pty(e.to_string()))?;
        let master: SharedMaster = Arc::new(Mutex::new(Some(master)));
        resize(&master);

        let _resizes = forward_resizes(Arc::clone(&master));
        let _raw = RawModeGuard::enable();

        // Never joined: a blocked stdin read must not hold up the return.
        std::thread::spawn(move || copy_stdin(writer));
        let mut output = tokio::task::spawn_blocking(move || copy_output(reader));
        let mut wait = tokio::task::spawn_blocking(move || child.wait());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                close(&master);
                if let Some(pid) = pid {
                    control.terminate_tree(ProcessTarget { pid, grouped: true });
                }
                match tokio::time::timeout(KILL_GRACE, &mut wait).await {
                    Ok(joined) => pty_exit_result(joined),
                    Err(_) => Err(VstaskError::Killed),
                }
            }
            joined = &mut wait => {
                close(&master);
                let _ = tokio::time::timeout(PTY_DRAIN, &mut output).await;
                pty_exit_result(joined)
            }
        }
    }
}

fn copy_stdin(mut writer: Box<dyn Write + Send>) {
    let mut stdin = std::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        match stdin.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if writer
                    .write_all(&buf[..n])
                    .and_then(|_| writer.flush())
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

fn copy_output(mut reader: Box<dyn Read + Send>) {
    let mut stdout = std::io::stdout();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stdout
                    .write_all(&buf[..n])
                    .and_then(|_| stdout.flush())
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

fn pty_exit_result(
    joined: Result<std::io::Result<portable_pty::ExitStatus>, tokio::task::JoinError>,
) -> VstaskResult<RunOutcome> {
    let status = joined.map_err(|e| VstaskError::Pty(e.to_string()))??;
    if status.success() {
        return Ok(RunOutcome::Exited);
    }
    let description = match status.signal() {
        Some(signal) => format!("signal: {}", signal),
        None => format!("exit status {}", status.exit_code()),
    };
    Err(VstaskError::Exit(description))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::control::UnixProcessControl;

    fn sh(script: &str) -> BuiltCommand {
        BuiltCommand {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: std::env::temp_dir(),
            env: std::env::vars().collect(),
        }
    }

    fn pty_available() -> bool {
        native_pty_system().openpty(local_size()).is_ok()
    }

    #[test]
    fn test_missing_program_is_a_permission_class_error() {
        if !pty_available() {
            return;
        }
        let mut command = sh("true");
        command.program = "/definitely/not/here/bash".into();
        match spawn(&command) {
            Err(err) => assert!(err.is_exec_permission_error(), "{err}"),
            Ok(_) => panic!("spawn of a missing program succeeded"),
        }
    }

    #[test]
    fn test_signalled_child_is_described_by_signal() {
        let err = pty_exit_result(Ok(Ok(portable_pty::ExitStatus::with_signal("Terminated"))))
            .unwrap_err();
        assert_eq!(err.to_string(), "signal: Terminated");

        let err = pty_exit_result(Ok(Ok(portable_pty::ExitStatus::with_exit_code(3)))).unwrap_err();
        assert_eq!(err.to_string(), "exit status 3");
    }

    #[tokio::test]
    async fn test_pty_session_reports_exit_status() {
        if !pty_available() {
            return;
        }
        let session = spawn(&sh("exit 4")).ok().unwrap();
        let err = session
            .run(&UnixProcessControl::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "exit status 4");

        let session = spawn(&sh("kill -TERM $$")).ok().unwrap();
        let err = session
            .run(&UnixProcessControl::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("signal: "), "{err}");

        let session = spawn(&sh("true")).ok().unwrap();
        let outcome = session
            .run(&UnixProcessControl::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Exited);
    }
}

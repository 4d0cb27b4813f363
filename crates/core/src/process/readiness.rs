//! Background task readiness
//!
//! A background dependency counts as satisfied once its output shows the
//! matcher's begin pattern, or as soon as output scanning starts when the
//! matcher activates on start. stdout and stderr are scanned independently,
//! so the relative order of their lines is not preserved.

use std::process::Stdio;
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::control::{ProcessControl, ProcessTarget};
use super::{exit_result, spawn_error, RunOutcome, KILL_GRACE};
use crate::configs::tasks::{BackgroundConfig, TaskConfig};
use crate::execution::command::BuiltCommand;
use crate::types::{VstaskError, VstaskResult};

/// Compiled background block of a task's problem matcher.
#[derive(Debug, Clone)]
pub struct BackgroundMatcher {
    pub activate_on_start: bool,
    pub begins: Option<Regex>,
    /// Kept for completeness; readiness never waits for it.
    pub ends: Option<Regex>,
}

impl BackgroundMatcher {
    /// Matcher for a background task, if its problem matcher can signal
    /// readiness at all.
    pub fn from_task(task: &TaskConfig) -> Option<Self> {
        if !task.is_background {
            return None;
        }
        let background = task.problem_matcher.as_ref()?.first_background()?;
        Self::compile(&background)
    }

    /// Invalid patterns are dropped. Without activation and a begin pattern
    /// there is nothing to wait for.
    pub fn compile(background: &BackgroundConfig) -> Option<Self> {
        let begins = compile_pattern(&background.begins_pattern);
        let ends = compile_pattern(&background.ends_pattern);

        if !background.active_on_start && begins.is_none() {
            return None;
        }
        Some(Self {
            activate_on_start: background.active_on_start,
            begins,
            ends,
        })
    }

    /// Ready as soon as output scanning starts.
    pub fn immediate() -> Self {
        Self {
            activate_on_start: true,
            begins: None,
            ends: None,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.begins.as_ref().is_some_and(|rx| rx.is_match(line))
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(rx) => Some(rx),
        Err(err) => {
            warn!(pattern, error = %err, "ignoring invalid background pattern");
            None
        }
    }
}

/// Run `command` with piped output until it is ready, exits, or `cancel`
/// fires. Once ready the process keeps running and its exit is never
/// observed.
pub async fn run_until_ready(
    command: &BuiltCommand,
    control: &dyn ProcessControl,
    matcher: &BackgroundMatcher,
    cancel: &CancellationToken,
) -> VstaskResult<RunOutcome> {
    if cancel.is_cancelled() {
        return Err(VstaskError::Cancelled);
    }
    let mut process = command.to_tokio();
    control.isolate(&mut process);
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = process
        .spawn()
        .map_err(|source| spawn_error(command, source))?;
    let pid = child.id();
    debug!(?pid, "background process started");

    let ready = CancellationToken::new();
    let matcher = Arc::new(matcher.clone());
    if let Some(stdout) = child.stdout.take() {
        scan(stdout, tokio::io::stdout(), Arc::clone(&matcher), ready.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        scan(stderr, tokio::io::stderr(), Arc::clone(&matcher), ready.clone());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Some(pid) = pid {
                control.terminate_tree(ProcessTarget { pid, grouped: true });
            }
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            Err(VstaskError::Cancelled)
        }
        _ = ready.cancelled() => {
            debug!(?pid, "background process ready");
            Ok(RunOutcome::Ready)
        }
        status = child.wait() => exit_result(status),
    }
}

/// Mirror `reader` into `sink` line by line, firing `ready` on a match.
///
/// A matcher that is active on start fires `ready` as soon as scanning
/// begins, before the first line is read, so a background task that never
/// prints still counts as ready.
fn scan<R, W>(
    reader: R,
    mut sink: W,
    matcher: Arc<BackgroundMatcher>,
    ready: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if matcher.activate_on_start {
            ready.cancel();
        }

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let _ = sink.write_all(&line).await;
            let _ = sink.flush().await;

            if ready.is_cancelled() {
                continue;
            }
            let text = String::from_utf8_lossy(&line);
            if matcher.matches(text.trim_end_matches(['\r', '\n'])) {
                ready.cancel();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;

    fn task(json: &str) -> TaskConfig {
        parse_tasks_config(&format!(r#"{{ "tasks": [ {} ] }}"#, json))
            .unwrap()
            .tasks
            .remove(0)
    }

    #[test]
    fn test_matcher_requires_background_flag() {
        let json = r#"{ "label": "w", "problemMatcher": { "background": { "activeOnStart": true } } }"#;
        assert!(BackgroundMatcher::from_task(&task(json)).is_none());

        let json = r#"{ "label": "w", "isBackground": true,
            "problemMatcher": { "background": { "activeOnStart": true } } }"#;
        let matcher = BackgroundMatcher::from_task(&task(json)).unwrap();
        assert!(matcher.activate_on_start);
        assert!(matcher.begins.is_none());
    }

    #[test]
    fn test_invalid_begin_pattern_without_activation_yields_no_matcher() {
        let json = r#"{ "label": "w", "isBackground": true,
            "problemMatcher": { "background": { "beginsPattern": "([unclosed" } } }"#;
        assert!(BackgroundMatcher::from_task(&task(json)).is_none());

        let json = r#"{ "label": "w", "isBackground": true, "problemMatcher": "$eslint-stylish" }"#;
        assert!(BackgroundMatcher::from_task(&task(json)).is_none());
    }

    #[test]
    fn test_tsc_watch_alias() {
        let json = r#"{ "label": "w", "isBackground": true, "problemMatcher": ["$tsc-watch"] }"#;
        let matcher = BackgroundMatcher::from_task(&task(json)).unwrap();
        assert!(matcher.matches("Starting compilation in watch mode..."));
        assert!(!matcher.matches("[12:00:00] Starting compilation in watch mode..."));
        assert!(matcher.matches("Found 0 errors. Watching for file changes."));
        assert!(!matcher.matches("error TS2304: Cannot find name 'x'."));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::time::{Duration, Instant};

        use crate::process::control::{process_gone, UnixProcessControl};

        fn sh(script: String, cwd: &std::path::Path) -> BuiltCommand {
            BuiltCommand {
                program: "/bin/sh".into(),
                args: vec!["-c".into(), script],
                cwd: cwd.to_path_buf(),
                env: std::env::vars().collect(),
            }
        }

        fn begins(pattern: &str) -> BackgroundMatcher {
            BackgroundMatcher::compile(&BackgroundConfig {
                active_on_start: false,
                begins_pattern: pattern.into(),
                ends_pattern: String::new(),
            })
            .unwrap()
        }

        fn kill_group(pid: u32) {
            let _ = nix::sys::signal::killpg(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGKILL,
            );
        }

        #[tokio::test]
        async fn test_begin_pattern_returns_before_exit() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("pid");
            let command = sh(
                format!(
                    "echo $$ > '{}'; echo booting; echo 'server listening on 8080'; sleep 30",
                    pid_file.display()
                ),
                dir.path(),
            );

            let started = Instant::now();
            let outcome = run_until_ready(
                &command,
                &UnixProcessControl::default(),
                &begins(r"listening on \d+"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
            assert_eq!(outcome, RunOutcome::Ready);
            assert!(started.elapsed() < Duration::from_secs(10));

            let pid: u32 = std::fs::read_to_string(&pid_file)
                .unwrap()
                .trim()
                .parse()
                .unwrap();
            assert!(!process_gone(pid));
            kill_group(pid);
        }

        #[tokio::test]
        async fn test_activate_on_start_returns_without_output() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("pid");
            let command = sh(
                format!("echo $$ > '{}'; exec sleep 30", pid_file.display()),
                dir.path(),
            );

            let outcome = run_until_ready(
                &command,
                &UnixProcessControl::default(),
                &BackgroundMatcher::immediate(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
            assert_eq!(outcome, RunOutcome::Ready);

            let start = Instant::now();
            while !pid_file.exists() && start.elapsed() < Duration::from_secs(5) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let pid: u32 = std::fs::read_to_string(&pid_file)
                .unwrap()
                .trim()
                .parse()
                .unwrap_or(0);
            if pid != 0 {
                kill_group(pid);
            }
        }

        #[tokio::test]
        async fn test_exit_before_ready_is_the_result() {
            let dir = tempfile::tempdir().unwrap();
            let control = UnixProcessControl::default();
            let cancel = CancellationToken::new();

            let ok = run_until_ready(
                &sh("echo nothing to see".into(), dir.path()),
                &control,
                &begins("never printed"),
                &cancel,
            )
            .await
            .unwrap();
            assert_eq!(ok, RunOutcome::Exited);

            let err = run_until_ready(
                &sh("echo broken >&2; exit 3".into(), dir.path()),
                &control,
                &begins("never printed"),
                &cancel,
            )
            .await
            .unwrap_err();
            assert_eq!(err.to_string(), "exit status 3");
        }

        #[tokio::test]
        async fn test_begin_pattern_on_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("pid");
            let command = sh(
                format!("echo $$ > '{}'; echo 'ready' >&2; sleep 30", pid_file.display()),
                dir.path(),
            );
            let outcome = run_until_ready(
                &command,
                &UnixProcessControl::default(),
                &begins("^ready$"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
            assert_eq!(outcome, RunOutcome::Ready);

            let pid: u32 = std::fs::read_to_string(&pid_file)
                .unwrap()
                .trim()
                .parse()
                .unwrap();
            kill_group(pid);
        }

        #[tokio::test]
        async fn test_cancel_before_ready() {
            let dir = tempfile::tempdir().unwrap();
            let cancel = CancellationToken::new();
            let canceller = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    cancel.cancel();
                })
            };

            let err = run_until_ready(
                &sh("sleep 30".into(), dir.path()),
                &UnixProcessControl::default(),
                &begins("never printed"),
                &cancel,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, VstaskError::Cancelled));
            canceller.await.unwrap();
        }
    }
}

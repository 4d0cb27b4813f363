//! Platform process control
//!
//! The rest of the engine only talks to [`ProcessControl`]; the concrete
//! implementation is picked once by [`native_process_control`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Delay between the graceful and the forceful signal on Unix.
pub const KILL_DELAY: Duration = Duration::from_secs(1);

/// A started child, and whether it leads its own process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTarget {
    pub pid: u32,
    pub grouped: bool,
}

pub trait ProcessControl: Send + Sync + std::fmt::Debug {
    /// Arrange for `command` to start in its own process group.
    fn isolate(&self, command: &mut tokio::process::Command);

    /// Terminate the target and everything it spawned. Returns without
    /// waiting for the processes to exit.
    fn terminate_tree(&self, target: ProcessTarget);

    /// Whether children may be started under a pseudo-terminal.
    fn supports_pty(&self) -> bool;
}

/// Process control for the platform this binary was built for.
pub fn native_process_control() -> Arc<dyn ProcessControl> {
    #[cfg(unix)]
    {
        Arc::new(UnixProcessControl::default())
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsProcessControl)
    }
}

#[cfg(unix)]
pub use unix::UnixProcessControl;

#[cfg(windows)]
pub use windows::WindowsProcessControl;

#[cfg(unix)]
mod unix {
    use super::*;

    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    /// SIGTERM to the group, SIGKILL after [`KILL_DELAY`].
    #[derive(Debug, Clone)]
    pub struct UnixProcessControl {
        kill_delay: Duration,
    }

    impl Default for UnixProcessControl {
        fn default() -> Self {
            Self {
                kill_delay: KILL_DELAY,
            }
        }
    }

    impl UnixProcessControl {
        pub fn with_kill_delay(kill_delay: Duration) -> Self {
            Self { kill_delay }
        }
    }

    fn send(target: ProcessTarget, signal: Signal) -> nix::Result<()> {
        let pid = Pid::from_raw(i32::try_from(target.pid).map_err(|_| nix::Error::EINVAL)?);
        if target.grouped {
            killpg(pid, signal)
        } else {
            kill(pid, signal)
        }
    }

    impl ProcessControl for UnixProcessControl {
        fn isolate(&self, command: &mut tokio::process::Command) {
            command.process_group(0);
        }

        fn terminate_tree(&self, target: ProcessTarget) {
            if let Err(err) = send(target, Signal::SIGTERM) {
                debug!(pid = target.pid, error = %err, "SIGTERM not delivered");
            }

            let delay = self.kill_delay;
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                // ESRCH here just means the tree is already gone.
                let _ = send(target, Signal::SIGKILL);
            });
        }

        fn supports_pty(&self) -> bool {
            true
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;

    use std::process::{Command, Stdio};

    /// Tree kill through `taskkill /T /F`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsProcessControl;

    impl ProcessControl for WindowsProcessControl {
        fn isolate(&self, _command: &mut tokio::process::Command) {}

        fn terminate_tree(&self, target: ProcessTarget) {
            let status = Command::new("taskkill")
                .args(["/T", "/F", "/PID", &target.pid.to_string()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if let Err(err) = status {
                debug!(pid = target.pid, error = %err, "taskkill failed");
            }
        }

        fn supports_pty(&self) -> bool {
            false
        }
    }
}


#[cfg(all(test, unix))]
pub(crate) use tests::process_gone;

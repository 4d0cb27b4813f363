//! Signal listening for a run's cancellation token

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::VstaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapSignal {
    /// SIGINT, or Ctrl-C on Windows.
    Interrupt,
    /// SIGTERM. Ignored where the platform has no equivalent.
    Terminate,
}

/// Signals that cancel a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSet(Vec<TrapSignal>);

impl SignalSet {
    pub fn new(signals: Vec<TrapSignal>) -> Self {
        Self(signals)
    }

    /// Interrupt and terminate on Unix, interrupt only on Windows.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self(vec![TrapSignal::Interrupt])
        } else {
            Self(vec![TrapSignal::Interrupt, TrapSignal::Terminate])
        }
    }

    /// No signal handling; cancellation only through the token.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn signals(&self) -> &[TrapSignal] {
        &self.0
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Cancels a token when one of the trapped signals arrives. Listening stops
/// when the listener is dropped.
#[derive(Debug)]
pub struct SignalListener {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Start listening for `set`, cancelling `token` on each delivery.
pub fn listen(set: &SignalSet, token: CancellationToken) -> VstaskResult<SignalListener> {
    let mut handles = Vec::new();
    for &signal in set.signals() {
        if let Some(handle) = watch(signal, token.clone())? {
            handles.push(handle);
        }
    }
    Ok(SignalListener { handles })
}

#[cfg(unix)]
fn watch(signal: TrapSignal, token: CancellationToken) -> VstaskResult<Option<JoinHandle<()>>> {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let kind = match signal {
        TrapSignal::Interrupt => SignalKind::interrupt(),
        TrapSignal::Terminate => SignalKind::terminate(),
    };
    let mut stream = unix_signal(kind)?;
    Ok(Some(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            debug!(?signal, "signal received, cancelling run");
            token.cancel();
        }
    })))
}

#[cfg(not(unix))]
fn watch(signal: TrapSignal, token: CancellationToken) -> VstaskResult<Option<JoinHandle<()>>> {
    if signal != TrapSignal::Interrupt {
        return Ok(None);
    }
    Ok(Some(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!(?signal, "ctrl-c received, cancelling run");
            token.cancel();
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_default_signal_set() {
        let set = SignalSet::platform_default();
        assert!(set.signals().contains(&TrapSignal::Interrupt));
        assert_eq!(
            set.signals().contains(&TrapSignal::Terminate),
            cfg!(not(windows))
        );
        assert!(SignalSet::none().signals().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        let token = CancellationToken::new();
        let _listener = listen(
            &SignalSet::new(vec![TrapSignal::Terminate]),
            token.clone(),
        )
        .unwrap();

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}

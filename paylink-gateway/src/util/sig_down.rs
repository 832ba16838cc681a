//! Shutdown on SIGTERM/SIGINT (Ctrl+C on Windows).
//!
//! [`SigDown`] watches for the first signal and cancels a
//! [`CancellationToken`]. Hand clones of the token to everything that must
//! stop, e.g. `axum::serve(..).with_graceful_shutdown(token.cancelled_owned())`.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Turns the first shutdown signal into a cancelled token.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct SigDown {
    watcher: TaskTracker,
    token: CancellationToken,
}

impl SigDown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let signal = first_signal()?;
        let token = CancellationToken::new();
        let watcher = TaskTracker::new();

        let cancel = token.clone();
        watcher.spawn(async move {
            tokio::select! {
                name = signal => tracing::info!(signal = name, "Shutting down"),
                () = cancel.cancelled() => {}
            }
            cancel.cancel();
        });
        watcher.close();

        Ok(Self { watcher, token })
    }

    /// A token cancelled on the first shutdown signal.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown without a signal.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits until shutdown was triggered and the watcher has exited.
    pub async fn recv(&self) {
        self.token.cancelled().await;
        self.watcher.wait().await;
    }
}

/// Resolves to the name of the first signal received.
#[cfg(unix)]
fn first_signal() -> Result<impl Future<Output = &'static str>, std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn first_signal() -> Result<impl Future<Output = &'static str>, std::io::Error> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_releases_waiters() {
        let sig_down = SigDown::try_new().unwrap();
        let token = sig_down.cancellation_token();
        assert!(!token.is_cancelled());
        sig_down.cancel();
        tokio::time::timeout(Duration::from_secs(1), sig_down.recv())
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}

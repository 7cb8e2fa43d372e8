//! Shutdown on SIGTERM / SIGINT (Ctrl+C elsewhere).
//!
//! [`SigDown`] turns the first shutdown signal into a fired
//! [`CancellationToken`]. The gate server stops accepting connections and
//! in-flight node executions observe the same token.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Signal listener owning the shutdown token.
#[allow(missing_debug_implementations)] // TaskTracker has no useful Debug
pub struct SigDown {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl SigDown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] if a handler cannot be registered.
    #[allow(clippy::unnecessary_wraps)] // only fallible on Unix
    pub fn try_new() -> Result<Self, std::io::Error> {
        Self::with_token(CancellationToken::new())
    }

    /// Installs the signal handlers, cancelling `token` on the first signal.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] if a handler cannot be registered.
    #[allow(clippy::unnecessary_wraps)]
    pub fn with_token(token: CancellationToken) -> Result<Self, std::io::Error> {
        let tracker = TaskTracker::new();
        let fire = token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
                    () = fire.cancelled() => return,
                }
                fire.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received Ctrl+C, shutting down"),
                    () = fire.cancelled() => return,
                }
                fire.cancel();
            });
        }

        tracker.close();
        Ok(Self { tracker, token })
    }

    /// A clone of the shutdown token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once shutdown was requested and the listener task exited.
    pub async fn recv(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}

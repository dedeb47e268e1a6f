//! Shutdown on SIGINT / SIGTERM.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels a token on the first shutdown signal.
///
/// Every clone of [`SigDown::cancellation_token`] observes the same cancellation, so
/// the HTTP server and any background work can wind down together.
pub struct SigDown {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SigDown {
    /// Installs the signal handlers. Must be called inside a Tokio runtime.
    pub fn try_new() -> std::io::Result<Self> {
        let token = CancellationToken::new();
        let shutdown = wait_for_signal()?;
        let task = {
            let token = token.clone();
            tokio::spawn(async move {
                shutdown.await;
                token.cancel();
            })
        };
        Ok(Self { token, task })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SigDown {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(unix)]
fn wait_for_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    })
}

#[cfg(not(unix))]
fn wait_for_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
        }
    })
}

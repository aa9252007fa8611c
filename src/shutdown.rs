use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

/// Set once by the termination path, polled by the monitor between wait
/// slices. Setting it is the only thing the interrupt side ever does.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn termination_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            warn!("ctrl-c listener failed: {e}");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("SIGTERM listener unavailable: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c listener failed: {e}");
        std::future::pending::<()>().await;
    }
}

/// Spawns a task that cancels `token` when the operator asks the process to
/// stop. Must be called from within a tokio runtime.
pub fn spawn_signal_listener(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        termination_requested().await;
        info!("Termination requested, stopping monitor...");
        token.cancel();
    })
}

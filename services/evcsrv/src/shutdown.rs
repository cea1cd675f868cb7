//! Shutdown signal handling for the HTTP listener

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolve on Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}; only Ctrl+C will stop the listener", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` once a shutdown signal arrives
pub fn spawn_signal_watcher(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel the returned token on Ctrl+C (SIGINT) or SIGTERM
pub fn setup_signal_handlers() -> Result<CancellationToken> {
    let token = CancellationToken::new();

    // Handle Ctrl+C (SIGINT)
    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }
        info!("Ctrl+C signal received");
        on_ctrl_c.cancel();
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        let on_sigterm = token.clone();
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("SIGTERM signal received");
                on_sigterm.cancel();
            }
        });
    }

    Ok(token)
}

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Token for `jobq monitor`, cancelled on the first SIGTERM or SIGINT.
///
/// [`Monitor::run`](crate::monitor::Monitor::run) races it against the
/// refresh tick and returns `Ok(())` once it fires, leaving the last frame on
/// screen and never holding the coordination lock when the process exits.
/// Must be called from within the tokio runtime.
pub fn install_shutdown_handler() -> io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
            }
        }

        trigger.cancel();
    });

    Ok(token)
}

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for SIGINT and SIGTERM.
///
/// Returns a `CancellationToken` that is cancelled when either signal is
/// received. The engine and the ingestor both stop on it.
///
/// # Errors
///
/// Fails if the signal handlers cannot be registered.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, dumping history");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, dumping history");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}

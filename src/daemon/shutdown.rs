use tracing::error;

/// Resolves once the process is asked to terminate: Ctrl-C everywhere, SIGTERM on unix.
///
/// On Windows detached processes can't detect signals sent to them, so only an attached console
/// can stop the daemon there.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => (),
                    _ = terminate.recv() => (),
                }
                return;
            }
            Err(e) => error!("Failed to listen for SIGTERM {e:?}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C {e:?}");
    }
}

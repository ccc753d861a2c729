use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Detects signals sent to the process. This works with limmited success.
///
/// On Windows detached processes can't detect signals sent to them, `stop` terminates them
/// forcefully instead and the lock file is cleaned up by the stopping side.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c");
        },
        _ = terminate_signal() => {
            info!("Received termination signal");
        },
        _ = cancelation.cancelled() => (),
    };
    cancelation.cancel();
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}

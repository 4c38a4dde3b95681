//! Process-level helpers.

use std::future::Future;
use std::pin::Pin;

use tokio::signal;
use tracing::{error, warn};

type SignalFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Resolve when the process is asked to stop (Ctrl+C or SIGTERM).
///
/// A signal whose handler cannot be installed is logged and ignored, so the
/// server keeps running and remains stoppable through the other signal.
pub async fn shutdown_signal() {
    tokio::select! {
        () = ctrl_c() => warn!("Received Ctrl+C, draining in-flight requests..."),
        () = terminate() => warn!("Received SIGTERM, draining in-flight requests..."),
    }
}

fn ctrl_c() -> SignalFuture {
    Box::pin(async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    })
}

#[cfg(unix)]
fn terminate() -> SignalFuture {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => Box::pin(async move {
            sigterm.recv().await;
        }),
        Err(e) => {
            error!(error = %e, "SIGTERM handler unavailable");
            Box::pin(std::future::pending())
        }
    }
}

#[cfg(not(unix))]
fn terminate() -> SignalFuture {
    Box::pin(std::future::pending())
}

//! Signal-driven abort requests
//!
//! A migration must not be killed mid-step: the orchestrator checks an
//! [`AbortFlag`] between steps and unwinds cleanly. This module turns the
//! first interrupt or terminate signal into a flag request.

use gantry_core::AbortFlag;
use tokio::task::JoinHandle;

/// Listen for ctrl-c (and SIGTERM on unix) and request an abort on `flag`
///
/// The task runs until a signal arrives; callers abort the handle once the
/// run finishes so a late signal cannot outlive it.
pub fn spawn_abort_listener(flag: AbortFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::warn!("abort requested; the current step will finish before unwinding");
        flag.request();
    })
}

async fn ctrl_c_or_never() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // No spurious aborts when the handler cannot be installed.
        tracing::warn!(%err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c_or_never() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "SIGTERM handler unavailable; listening for ctrl-c only");
            ctrl_c_or_never().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c_or_never().await;
}

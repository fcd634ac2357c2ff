use tokio_util::sync::CancellationToken;
use trigger_config::trg_info;

/// Register Ctrl-C (SIGINT) and SIGTERM handling; cancel `cancel` on
/// the first signal received. Same shape as the teacher's
/// `wf_runtime::lifecycle::wait_for_signal`.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                trg_info!(sys, signal = "SIGINT", "received signal, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                trg_info!(sys, signal = "SIGTERM", "received signal, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl-C");
        trg_info!(sys, "received shutdown signal, initiating graceful shutdown");
    }
    cancel.cancel();
}

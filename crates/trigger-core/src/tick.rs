use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use trigger_config::{trg_error, trg_info};
use trigger_store::StateStore;
use trigger_tmc::TriggerModeController;

use crate::handler::EventHandler;
use crate::metrics::TriggerMetrics;

/// Periodic sweep for `batch`/`interval` rules that nobody's live
/// traffic happens to flush (spec.md §4.6 closing paragraph, §7):
/// batches stuck below `batch_size` past `max_wait_seconds`, and
/// interval rules whose window has simply elapsed with no further
/// events to trigger the check. Runs until `cancel` fires, same
/// interval-loop-plus-cancellation shape as the teacher's evictor task
/// (`wf-runtime::lifecycle`).
pub async fn run<S: StateStore>(
    tmc: Arc<TriggerModeController<S>>,
    handler: Arc<EventHandler<S>>,
    metrics: Arc<TriggerMetrics>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                trg_info!(sys, "tick loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                sweep_once(&tmc, &handler, &metrics).await;
            }
        }
    }
}

async fn sweep_once<S: StateStore>(
    tmc: &TriggerModeController<S>,
    handler: &EventHandler<S>,
    metrics: &TriggerMetrics,
) {
    match tmc.sweep_batches().await {
        Ok(batches) => {
            for batch in batches {
                if let Err(e) = handler.handle_swept_batch(batch).await {
                    trg_error!(sys, error = %e, "swept batch processing failed");
                }
            }
        }
        Err(e) => trg_error!(sys, error = %e, "batch sweep failed"),
    }

    match tmc.sweep_intervals().await {
        Ok(intervals) => {
            for interval in intervals {
                if let Err(e) = handler.handle_swept_interval(interval).await {
                    trg_error!(sys, error = %e, "swept interval processing failed");
                }
            }
        }
        Err(e) => trg_error!(sys, error = %e, "interval sweep failed"),
    }

    trg_info!(sys, summary = %metrics.summary_line(), "tick summary");
}

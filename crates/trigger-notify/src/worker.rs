use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trigger_config::{trg_debug, trg_warn};
use trigger_store::StateStore;
use trigger_types::NotificationTask;

use crate::backoff::calculate_delay;
use crate::channel::{ChannelError, NotificationChannel};
use crate::error::NotifyResult;
use crate::metrics::NotifyMetrics;

/// Tuning for the delivery worker — `NOTIFICATION_MAX_RETRY` and
/// friends (spec.md §4.7, §6).
#[derive(Debug, Clone, Copy)]
pub struct NotifyWorkerConfig {
    /// Concurrent in-flight sends.
    pub concurrency: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry: u32,
    /// How long each `notify_queue_pop` call blocks for work.
    pub pop_timeout_seconds: u64,
    /// How long to wait for in-flight sends to finish on shutdown
    /// before aborting and re-queuing them.
    pub drain_grace: Duration,
}

impl Default for NotifyWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_retry: 3,
            pop_timeout_seconds: 1,
            drain_grace: Duration::from_secs(10),
        }
    }
}

/// Pops queued notification tasks and delivers them, fanning
/// concurrent sends out across a bounded pool (teacher's
/// `Scheduler::dispatch_batch` `JoinSet` + `Semaphore` shape), retrying
/// transient failures with backoff and dead-lettering the rest.
pub struct NotificationWorker<S: StateStore> {
    store: Arc<S>,
    channel: Arc<dyn NotificationChannel>,
    cancel: CancellationToken,
    config: NotifyWorkerConfig,
    metrics: Arc<NotifyMetrics>,
}

impl<S: StateStore + 'static> NotificationWorker<S> {
    pub fn new(
        store: Arc<S>,
        channel: Arc<dyn NotificationChannel>,
        cancel: CancellationToken,
        config: NotifyWorkerConfig,
    ) -> Self {
        Self {
            store,
            channel,
            cancel,
            config,
            metrics: Arc::new(NotifyMetrics::new()),
        }
    }

    /// Read-only handle to this worker's delivery-outcome counters —
    /// for wiring into a `/metrics` surface or periodic log line.
    pub fn metrics(&self) -> Arc<NotifyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until cancelled, then drain in-flight sends up to
    /// `config.drain_grace` before returning.
    pub async fn run(self) -> NotifyResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let in_flight: Arc<Mutex<HashMap<u64, NotificationTask>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let next_id = AtomicU64::new(0);
        let mut join_set: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                popped = self.store.notify_queue_pop(self.config.pop_timeout_seconds) => {
                    match popped? {
                        Some(task) => {
                            if task.retry_after.is_some_and(|ready_at| ready_at > Utc::now()) {
                                // Not yet due — re-push instead of holding a
                                // concurrency slot asleep until it is.
                                trg_debug!(notify, rule_id = %task.rule_id, "deferring not-yet-ready task");
                                self.store.notify_queue_push(&task).await?;
                                continue;
                            }
                            let id = next_id.fetch_add(1, Ordering::SeqCst);
                            in_flight.lock().unwrap().insert(id, task.clone());
                            let store = Arc::clone(&self.store);
                            let channel = Arc::clone(&self.channel);
                            let permit = Arc::clone(&semaphore);
                            let config = self.config;
                            let in_flight = Arc::clone(&in_flight);
                            join_set.spawn(async move {
                                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                                deliver(&*store, &*channel, task, config).await;
                                in_flight.lock().unwrap().remove(&id);
                            });
                        }
                        None => {}
                    }
                }
                Some(result) = join_set.join_next(), if !join_set.is_empty() => {
                    if let Err(e) = result {
                        trg_warn!(notify, error = %e, "delivery task panicked");
                    }
                }
                _ = self.cancel.cancelled() => {
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(self.config.drain_grace, async {
            while join_set.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
        }

        let stranded: Vec<NotificationTask> = in_flight.lock().unwrap().drain().map(|(_, t)| t).collect();
        for task in stranded {
            trg_debug!(notify, rule_id = %task.rule_id, "re-queuing task stranded by shutdown");
            self.store.notify_queue_push(&task).await?;
        }

        Ok(())
    }
}

/// Deliver (or retry, dead-letter) a single task. Lives outside the
/// worker's `impl` block so it only needs `&dyn` arguments, not a whole
/// worker instance. Callers must only hand this a task whose
/// `retry_after` has already elapsed — `run`'s pop loop re-queues
/// not-yet-ready tasks before a concurrency slot is ever acquired.
async fn deliver<S: StateStore>(
    store: &S,
    channel: &dyn NotificationChannel,
    task: NotificationTask,
    config: NotifyWorkerConfig,
) {
    match channel.send(&task.target, &task.message).await {
        Ok(()) => {
            trg_debug!(notify, rule_id = %task.rule_id, "notification delivered");
        }
        Err(ChannelError::Permanent(reason)) => {
            trg_warn!(notify, rule_id = %task.rule_id, %reason, "permanent channel error, dead-lettering");
            let _ = store.notify_dead_letter_push(&task).await;
        }
        Err(ChannelError::Transient(reason)) => {
            let retry_count = task.retry_count + 1;
            if retry_count > config.max_retry {
                trg_warn!(notify, rule_id = %task.rule_id, %reason, retry_count, "exhausted retries, dead-lettering");
                let mut dead = task;
                dead.retry_count = retry_count;
                let _ = store.notify_dead_letter_push(&dead).await;
            } else {
                let delay = calculate_delay(retry_count, config.base_delay, config.max_delay);
                let mut retry_task = task;
                retry_task.retry_count = retry_count;
                retry_task.retry_after = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                trg_debug!(notify, rule_id = %retry_task.rule_id, retry_count, %reason, "transient failure, re-queuing with backoff");
                let _ = store.notify_queue_push(&retry_task).await;
            }
        }
    }
}

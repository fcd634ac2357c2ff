use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use trigger_store::StateStore;
use trigger_types::{Event, LLMConfig, Rule, RuleConfig, TriggerMode};

use crate::error::{TmcError, TmcResult};
use crate::types::{AnalysisPayload, Decision, IntervalCompletion, SweptBatch, SweptInterval};

const INTERVAL_LOCK_TTL_SECONDS: u64 = 30;

/// Per-(rule, context_key) state machine selecting whether an event
/// skips, pends, or triggers LLM inference, for the three trigger
/// modes in spec.md §4.5.
///
/// All authoritative state (accumulators, timestamps, locks) lives in
/// the [`StateStore`] behind atomic operations, per spec.md §9's
/// explicit warning against in-process shortcuts for this state —
/// the only thing kept locally is `active`, a best-effort registry of
/// (rule, context_key) pairs this process has seen, used purely to
/// know what to examine on the next [`Self::sweep_batches`]/
/// [`Self::sweep_intervals`] tick. A pair missing from `active` on one
/// worker is simply not swept *by that worker*; whichever worker last
/// saw an event for it will sweep it, so the delay bound still holds
/// workspace-wide.
pub struct TriggerModeController<S: StateStore> {
    store: Arc<S>,
    active: Mutex<HashMap<(String, String), Rule>>,
}

impl<S: StateStore> TriggerModeController<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn llm_config(rule: &Rule) -> TmcResult<&LLMConfig> {
        rule.rule_config
            .llm_config()
            .ok_or_else(|| TmcError::NotLlmRule(rule.rule_id.clone()))
    }

    async fn track(&self, rule: &Rule, context_key: &str) {
        if matches!(
            Self::llm_config(rule).map(|c| c.trigger_mode),
            Ok(TriggerMode::Batch { .. } | TriggerMode::Interval { .. })
        ) {
            self.active
                .lock()
                .await
                .insert((rule.rule_id.clone(), context_key.to_string()), rule.clone());
        }
    }

    async fn untrack_if_idle(&self, rule_id: &str, context_key: &str) {
        if self.store.batch_since_get(rule_id, context_key).await.ok().flatten().is_none() {
            self.active
                .lock()
                .await
                .remove(&(rule_id.to_string(), context_key.to_string()));
        }
    }

    /// Decide what `event` does for `rule`'s trigger mode. `rule` must
    /// be an `llm` or `hybrid` rule (the caller is expected to have
    /// already passed the expression pre-filter for hybrid rules).
    pub async fn decide(&self, rule: &Rule, event: &Event) -> TmcResult<Decision> {
        let llm_config = Self::llm_config(rule)?;
        let context_key = &event.context_key;

        match llm_config.trigger_mode {
            TriggerMode::Realtime => Ok(Decision::Trigger {
                payload: AnalysisPayload::Window,
                completion: None,
            }),
            TriggerMode::Batch {
                batch_size,
                max_wait_seconds,
            } => {
                self.track(rule, context_key).await;
                self.decide_batch(&rule.rule_id, context_key, event, batch_size, max_wait_seconds)
                    .await
            }
            TriggerMode::Interval { interval_seconds } => {
                self.track(rule, context_key).await;
                self.decide_interval(&rule.rule_id, context_key, interval_seconds)
                    .await
            }
        }
    }

    async fn decide_batch(
        &self,
        rule_id: &str,
        context_key: &str,
        event: &Event,
        batch_size: u32,
        max_wait_seconds: u64,
    ) -> TmcResult<Decision> {
        let size = self
            .store
            .batch_append(rule_id, context_key, &event.as_ref())
            .await?;
        if size == 1 {
            self.store
                .batch_since_set(rule_id, context_key, event.timestamp)
                .await?;
        }

        if size >= batch_size as u64 {
            return self.flush_batch(rule_id, context_key).await;
        }

        let since = self
            .store
            .batch_since_get(rule_id, context_key)
            .await?
            .unwrap_or(event.timestamp);
        let elapsed = (Utc::now() - since).num_seconds().max(0) as u64;
        if elapsed >= max_wait_seconds {
            return self.flush_batch(rule_id, context_key).await;
        }

        Ok(Decision::Pending)
    }

    async fn flush_batch(&self, rule_id: &str, context_key: &str) -> TmcResult<Decision> {
        let snapshot = self.store.batch_snapshot_and_clear(rule_id, context_key).await?;
        self.store.batch_since_clear(rule_id, context_key).await?;
        Ok(Decision::Trigger {
            payload: AnalysisPayload::Batch(snapshot),
            completion: None,
        })
    }

    async fn decide_interval(
        &self,
        rule_id: &str,
        context_key: &str,
        interval_seconds: u64,
    ) -> TmcResult<Decision> {
        let last = self.store.interval_last_get(rule_id, context_key).await?;
        let elapsed = last.map(|l| (Utc::now() - l).num_seconds().max(0) as u64);
        if elapsed.is_some_and(|e| e < interval_seconds) {
            return Ok(Decision::Skip);
        }

        let token = random_token();
        let acquired = self
            .store
            .interval_lock_try_acquire(rule_id, context_key, &token, INTERVAL_LOCK_TTL_SECONDS)
            .await?;
        if !acquired {
            return Ok(Decision::Skip);
        }

        Ok(Decision::Trigger {
            payload: AnalysisPayload::Window,
            completion: Some(IntervalCompletion {
                rule_id: rule_id.to_string(),
                context_key: context_key.to_string(),
                token,
            }),
        })
    }

    /// Update `last` and release the advisory lock for an interval-mode
    /// trigger, once the LLM call it guarded has finished. Must be
    /// called exactly once per `Decision::Trigger` with `Some(completion)`.
    pub async fn complete_interval(&self, completion: IntervalCompletion) -> TmcResult<()> {
        self.store
            .interval_last_set(&completion.rule_id, &completion.context_key, Utc::now())
            .await?;
        self.store
            .interval_lock_release(&completion.rule_id, &completion.context_key, &completion.token)
            .await?;
        Ok(())
    }

    /// Flush any batch accumulator whose `max_wait_seconds` has elapsed
    /// even though no new event arrived, so the delay bound in spec.md
    /// §4.5/§9 holds independent of event arrival. Safe to call
    /// concurrently from multiple workers — the underlying
    /// snapshot-and-clear is atomic, so at most one sweep wins per
    /// accumulator.
    pub async fn sweep_batches(&self) -> TmcResult<Vec<SweptBatch>> {
        let candidates: Vec<(String, String, Rule)> = self
            .active
            .lock()
            .await
            .iter()
            .filter(|(_, rule)| {
                matches!(
                    rule.rule_config.llm_config().map(|c| c.trigger_mode),
                    Some(TriggerMode::Batch { .. })
                )
            })
            .map(|((rule_id, context_key), rule)| (rule_id.clone(), context_key.clone(), rule.clone()))
            .collect();

        let mut flushed = Vec::new();
        for (rule_id, context_key, rule) in candidates {
            let Some(TriggerMode::Batch { max_wait_seconds, .. }) =
                rule.rule_config.llm_config().map(|c| c.trigger_mode)
            else {
                continue;
            };
            let Some(since) = self.store.batch_since_get(&rule_id, &context_key).await? else {
                self.untrack_if_idle(&rule_id, &context_key).await;
                continue;
            };
            let elapsed = (Utc::now() - since).num_seconds().max(0) as u64;
            if elapsed < max_wait_seconds {
                continue;
            }
            let events = self
                .store
                .batch_snapshot_and_clear(&rule_id, &context_key)
                .await?;
            self.store.batch_since_clear(&rule_id, &context_key).await?;
            if events.is_empty() {
                continue;
            }
            flushed.push(SweptBatch {
                rule_id,
                context_key,
                events,
            });
        }
        Ok(flushed)
    }

    /// Fire interval-mode analysis for rules whose clock has elapsed
    /// with no new event arriving, so "empty-window" reports work as
    /// documented (spec.md §4.5/§9). Caller must call
    /// [`Self::complete_interval`] on each returned entry's
    /// `completion` once its LLM call finishes.
    pub async fn sweep_intervals(&self) -> TmcResult<Vec<SweptInterval>> {
        let candidates: Vec<(String, String, u64)> = self
            .active
            .lock()
            .await
            .iter()
            .filter_map(|((rule_id, context_key), rule)| match rule.rule_config.llm_config() {
                Some(LLMConfig {
                    trigger_mode: TriggerMode::Interval { interval_seconds },
                    ..
                }) => Some((rule_id.clone(), context_key.clone(), *interval_seconds)),
                _ => None,
            })
            .collect();

        let mut fired = Vec::new();
        for (rule_id, context_key, interval_seconds) in candidates {
            match self.decide_interval(&rule_id, &context_key, interval_seconds).await? {
                Decision::Trigger {
                    completion: Some(completion),
                    ..
                } => fired.push(SweptInterval {
                    rule_id,
                    context_key,
                    completion,
                }),
                _ => continue,
            }
        }
        Ok(fired)
    }
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

use std::sync::Arc;

use chrono::Utc;
use trigger_store::StateStore;
use trigger_types::{NotificationTask, NotifyPolicy, Target};

use crate::error::NotifyResult;

/// Result of attempting to enqueue one target's notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    DeduplicatedByCooldown,
    RateLimited,
}

/// Dedup → rate-limit → push gate (spec.md §4.7). One call per target;
/// callers fan a single firing out across `notify_policy.targets`.
pub struct NotificationGate<S: StateStore> {
    store: Arc<S>,
}

impl<S: StateStore> NotificationGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn enqueue(
        &self,
        rule_id: &str,
        context_key: &str,
        target: &Target,
        message: &str,
        policy: &NotifyPolicy,
    ) -> NotifyResult<EnqueueOutcome> {
        // Keyed on (rule, context_key, target) — spec.md §4.7 defines
        // the dedup window per (rule, context_key), but this gate is
        // called once per target (handler.rs fans a single firing out
        // across `notify_policy.targets`), so the target is folded in
        // too; otherwise a second target in the same firing would read
        // as an already-deduplicated repeat. Dropping `context_key`
        // here was the bug: a match-all rule firing for one context
        // key would wrongly suppress a later firing for a different
        // context key within the same cooldown.
        let dedup_key = format!("{rule_id}:{context_key}:{}", target.dedup_key());
        let accepted = self
            .store
            .notify_dedup_try_set(&dedup_key, policy.rate_limit.cooldown_seconds)
            .await?;
        if !accepted {
            return Ok(EnqueueOutcome::DeduplicatedByCooldown);
        }

        if policy.rate_limit.max_per_minute == 0 {
            return Ok(EnqueueOutcome::RateLimited);
        }

        let minute_bucket = Utc::now().timestamp() / 60;
        let count = self.store.notify_rate_incr(rule_id, minute_bucket).await?;
        if count > policy.rate_limit.max_per_minute as u64 {
            return Ok(EnqueueOutcome::RateLimited);
        }

        let task = NotificationTask {
            rule_id: rule_id.to_string(),
            context_key: context_key.to_string(),
            target: target.clone(),
            message: message.to_string(),
            retry_count: 0,
            retry_after: None,
            created_at: Utc::now(),
        };
        self.store.notify_queue_push(&task).await?;
        Ok(EnqueueOutcome::Queued)
    }
}

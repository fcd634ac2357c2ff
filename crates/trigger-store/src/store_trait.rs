use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trigger_types::{Event, EventRef, NotificationTask, Rule};

use crate::error::StoreResult;

/// Every stateful primitive the trigger service needs, behind typed
/// methods — no call site issues a raw Redis command. Implemented by
/// [`crate::redis_store::RedisStore`] against real Redis and by
/// [`crate::fake::InMemoryStore`] for tests that don't need live
/// infrastructure.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Claim `event_id` for processing. Returns `true` the first time
    /// it's claimed, `false` on every subsequent call within the
    /// idempotency window.
    async fn idempotency_claim(&self, event_id: &str) -> StoreResult<bool>;

    async fn context_append(
        &self,
        context_key: &str,
        event: &Event,
        max_events: u32,
        window_seconds: u64,
    ) -> StoreResult<()>;

    /// Events in ascending timestamp order.
    async fn context_read(&self, context_key: &str) -> StoreResult<Vec<Event>>;

    async fn rules_version(&self) -> StoreResult<u64>;
    async fn rules_bump_version(&self) -> StoreResult<u64>;
    async fn rules_put(&self, rule: &Rule) -> StoreResult<()>;
    async fn rules_get(&self, rule_id: &str) -> StoreResult<Option<Rule>>;
    async fn rules_delete(&self, rule_id: &str) -> StoreResult<()>;
    async fn rules_index_add(&self, event_type: &str, rule_id: &str) -> StoreResult<()>;
    async fn rules_index_remove(&self, event_type: &str, rule_id: &str) -> StoreResult<()>;
    async fn rules_index_get(&self, event_type: &str) -> StoreResult<Vec<String>>;
    /// Publish a pub/sub hint; never a correctness dependency — the
    /// version counter is the source of truth.
    async fn rules_publish_update(&self, action: &str, rule_id: &str) -> StoreResult<()>;

    async fn llm_cache_get(&self, rule_id: &str, context_hash: &str) -> StoreResult<Option<String>>;
    async fn llm_cache_put(
        &self,
        rule_id: &str,
        context_hash: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreResult<()>;

    /// Append an event reference to the batch accumulator, returning
    /// the accumulator's new size.
    async fn batch_append(
        &self,
        rule_id: &str,
        context_key: &str,
        event_ref: &EventRef,
    ) -> StoreResult<u64>;

    /// Atomically read and clear the batch accumulator.
    async fn batch_snapshot_and_clear(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Vec<EventRef>>;

    async fn batch_since_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>>;
    async fn batch_since_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn batch_since_clear(&self, rule_id: &str, context_key: &str) -> StoreResult<()>;

    async fn interval_last_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>>;
    async fn interval_last_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Acquire the interval advisory lock, `token` identifying this
    /// holder so release can verify ownership before deleting.
    async fn interval_lock_try_acquire(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
        ttl_seconds: u64,
    ) -> StoreResult<bool>;
    /// Release the lock iff still held by `token`. Returns whether the
    /// lock was actually released by this call.
    async fn interval_lock_release(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
    ) -> StoreResult<bool>;

    async fn notify_dedup_try_set(&self, dedup_key: &str, cooldown_seconds: u64) -> StoreResult<bool>;
    /// Increment the per-(rule, minute) send counter, returning the
    /// post-increment count.
    async fn notify_rate_incr(&self, rule_id: &str, minute_bucket: i64) -> StoreResult<u64>;

    async fn notify_queue_push(&self, task: &NotificationTask) -> StoreResult<()>;
    /// Block up to `timeout_seconds` for the next queued task.
    async fn notify_queue_pop(&self, timeout_seconds: u64) -> StoreResult<Option<NotificationTask>>;
    async fn notify_dead_letter_push(&self, task: &NotificationTask) -> StoreResult<()>;
}

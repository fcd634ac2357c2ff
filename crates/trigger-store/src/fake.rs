use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trigger_types::{Event, EventRef, NotificationTask, Rule};

use crate::error::StoreResult;
use crate::store_trait::StateStore;

/// In-process [`StateStore`] backed by plain `HashMap`/`VecDeque`s
/// behind a single [`Mutex`].
///
/// Exists so `trigger-core`/`trigger-tmc`/`trigger-llm`/`trigger-notify`
/// can exercise their logic against a real `StateStore` implementation
/// without a live Redis — a normal `pub` type rather than
/// `#[cfg(test)]`-gated, since `cfg(test)` doesn't cross crate
/// boundaries and every one of those crates' own test suites needs to
/// construct one. Not a candidate for production use: a single mutex
/// serializes every operation.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    processed: std::collections::HashSet<String>,
    context: HashMap<String, Vec<Event>>,
    rules_version: u64,
    rules: HashMap<String, Rule>,
    rules_index: HashMap<String, Vec<String>>,
    llm_cache: HashMap<(String, String), (String, DateTime<Utc>)>,
    batches: HashMap<(String, String), Vec<EventRef>>,
    batch_since: HashMap<(String, String), DateTime<Utc>>,
    interval_last: HashMap<(String, String), DateTime<Utc>>,
    interval_locks: HashMap<(String, String), (String, DateTime<Utc>)>,
    notify_dedup: HashMap<String, DateTime<Utc>>,
    notify_rate: HashMap<(String, i64), u64>,
    notify_queue: VecDeque<NotificationTask>,
    notify_dead_letter: Vec<NotificationTask>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of tasks currently in the dead letter list, for assertions.
    pub fn dead_letters(&self) -> Vec<NotificationTask> {
        self.inner.lock().unwrap().notify_dead_letter.clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn idempotency_claim(&self, event_id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.processed.insert(event_id.to_string()))
    }

    async fn context_append(
        &self,
        context_key: &str,
        event: &Event,
        max_events: u32,
        window_seconds: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.context.entry(context_key.to_string()).or_default();
        entry.push(event.clone());
        entry.sort_by_key(|e| e.timestamp);

        let cutoff = Utc::now() - chrono::Duration::seconds(window_seconds as i64);
        entry.retain(|e| e.timestamp >= cutoff);

        let len = entry.len();
        if len > max_events as usize {
            entry.drain(0..len - max_events as usize);
        }
        Ok(())
    }

    async fn context_read(&self, context_key: &str) -> StoreResult<Vec<Event>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.context.get(context_key).cloned().unwrap_or_default())
    }

    async fn rules_version(&self) -> StoreResult<u64> {
        Ok(self.inner.lock().unwrap().rules_version)
    }

    async fn rules_bump_version(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.rules_version += 1;
        Ok(inner.rules_version)
    }

    async fn rules_put(&self, rule: &Rule) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.insert(rule.rule_id.clone(), rule.clone());
        Ok(())
    }

    async fn rules_get(&self, rule_id: &str) -> StoreResult<Option<Rule>> {
        Ok(self.inner.lock().unwrap().rules.get(rule_id).cloned())
    }

    async fn rules_delete(&self, rule_id: &str) -> StoreResult<()> {
        self.inner.lock().unwrap().rules.remove(rule_id);
        Ok(())
    }

    async fn rules_index_add(&self, event_type: &str, rule_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.rules_index.entry(event_type.to_string()).or_default();
        if !entry.iter().any(|id| id == rule_id) {
            entry.push(rule_id.to_string());
        }
        Ok(())
    }

    async fn rules_index_remove(&self, event_type: &str, rule_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.rules_index.get_mut(event_type) {
            entry.retain(|id| id != rule_id);
        }
        Ok(())
    }

    async fn rules_index_get(&self, event_type: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules_index
            .get(event_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn rules_publish_update(&self, _action: &str, _rule_id: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn llm_cache_get(&self, rule_id: &str, context_hash: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        let key = (rule_id.to_string(), context_hash.to_string());
        if let Some((value, expires_at)) = inner.llm_cache.get(&key).cloned() {
            if expires_at > Utc::now() {
                return Ok(Some(value));
            }
            inner.llm_cache.remove(&key);
        }
        Ok(None)
    }

    async fn llm_cache_put(
        &self,
        rule_id: &str,
        context_hash: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.llm_cache.insert(
            (rule_id.to_string(), context_hash.to_string()),
            (value.to_string(), Utc::now() + chrono::Duration::seconds(ttl_seconds as i64)),
        );
        Ok(())
    }

    async fn batch_append(
        &self,
        rule_id: &str,
        context_key: &str,
        event_ref: &EventRef,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .batches
            .entry((rule_id.to_string(), context_key.to_string()))
            .or_default();
        entry.push(event_ref.clone());
        Ok(entry.len() as u64)
    }

    async fn batch_snapshot_and_clear(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Vec<EventRef>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .batches
            .remove(&(rule_id.to_string(), context_key.to_string()))
            .unwrap_or_default())
    }

    async fn batch_since_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .batch_since
            .get(&(rule_id.to_string(), context_key.to_string()))
            .copied())
    }

    async fn batch_since_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .batch_since
            .insert((rule_id.to_string(), context_key.to_string()), ts);
        Ok(())
    }

    async fn batch_since_clear(&self, rule_id: &str, context_key: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .batch_since
            .remove(&(rule_id.to_string(), context_key.to_string()));
        Ok(())
    }

    async fn interval_last_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .interval_last
            .get(&(rule_id.to_string(), context_key.to_string()))
            .copied())
    }

    async fn interval_last_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .interval_last
            .insert((rule_id.to_string(), context_key.to_string()), ts);
        Ok(())
    }

    async fn interval_lock_try_acquire(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
        ttl_seconds: u64,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (rule_id.to_string(), context_key.to_string());
        let now = Utc::now();
        if let Some((_, expires_at)) = inner.interval_locks.get(&key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        inner.interval_locks.insert(
            key,
            (token.to_string(), now + chrono::Duration::seconds(ttl_seconds as i64)),
        );
        Ok(true)
    }

    async fn interval_lock_release(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (rule_id.to_string(), context_key.to_string());
        match inner.interval_locks.get(&key) {
            Some((held_by, _)) if held_by == token => {
                inner.interval_locks.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn notify_dedup_try_set(&self, dedup_key: &str, cooldown_seconds: u64) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        if let Some(expires_at) = inner.notify_dedup.get(dedup_key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        inner.notify_dedup.insert(
            dedup_key.to_string(),
            now + chrono::Duration::seconds(cooldown_seconds as i64),
        );
        Ok(true)
    }

    async fn notify_rate_incr(&self, rule_id: &str, minute_bucket: i64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let count = inner
            .notify_rate
            .entry((rule_id.to_string(), minute_bucket))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn notify_queue_push(&self, task: &NotificationTask) -> StoreResult<()> {
        self.inner.lock().unwrap().notify_queue.push_back(task.clone());
        Ok(())
    }

    async fn notify_queue_pop(&self, _timeout_seconds: u64) -> StoreResult<Option<NotificationTask>> {
        Ok(self.inner.lock().unwrap().notify_queue.pop_front())
    }

    async fn notify_dead_letter_push(&self, task: &NotificationTask) -> StoreResult<()> {
        self.inner.lock().unwrap().notify_dead_letter.push(task.clone());
        Ok(())
    }
}

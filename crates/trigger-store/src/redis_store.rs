use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use trigger_types::{Event, EventRef, NotificationTask, Rule};

use crate::error::StoreResult;
use crate::store_trait::StateStore;

const IDEMPOTENCY_TTL_SECONDS: u64 = 3600;
const NOTIFY_RATE_TTL_SECONDS: u64 = 120;

/// Redis-backed [`StateStore`]. Cheap to clone — [`ConnectionManager`]
/// is itself a handle around a shared, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn context_key_name(context_key: &str) -> String {
    format!("trigger:context:{context_key}")
}

fn rules_detail_key(rule_id: &str) -> String {
    format!("trigger:rules:detail:{rule_id}")
}

fn rules_index_key(event_type: &str) -> String {
    format!("trigger:rules:index:{event_type}")
}

fn llm_cache_key(rule_id: &str, context_hash: &str) -> String {
    format!("trigger:llm:cache:{rule_id}:{context_hash}")
}

fn batch_key(rule_id: &str, context_key: &str) -> String {
    format!("trigger:batch:{rule_id}:{context_key}")
}

fn batch_since_key(rule_id: &str, context_key: &str) -> String {
    format!("trigger:batch:since:{rule_id}:{context_key}")
}

fn interval_last_key(rule_id: &str, context_key: &str) -> String {
    format!("trigger:interval:last:{rule_id}:{context_key}")
}

fn interval_lock_key(rule_id: &str, context_key: &str) -> String {
    format!("trigger:interval:lock:{rule_id}:{context_key}")
}

fn notify_dedup_key(dedup_key: &str) -> String {
    format!("trigger:notify:dedup:{dedup_key}")
}

fn notify_rate_key(rule_id: &str, minute_bucket: i64) -> String {
    format!("trigger:notify:rate:{rule_id}:{minute_bucket}")
}

const NOTIFY_QUEUE_KEY: &str = "trigger:notify:queue";
const NOTIFY_DEAD_LETTER_KEY: &str = "trigger:notify:deadletter";
const RULES_VERSION_KEY: &str = "trigger:rules:version";
const RULES_UPDATE_CHANNEL: &str = "trigger:rules:update";

/// Atomically pop-all and clear a list — used for batch
/// snapshot-and-clear so a concurrent append can never be silently
/// dropped between the read and the clear.
const SNAPSHOT_AND_CLEAR_SCRIPT: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
redis.call('DEL', KEYS[1])
return items
"#;

/// Release a lock only if the caller still holds it — never delete a
/// lock acquired by someone else after ours expired.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

fn timestamp_score(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64
}

#[async_trait]
impl StateStore for RedisStore {
    async fn idempotency_claim(&self, event_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let key = format!("trigger:processed:{event_id}");
        let claimed: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(IDEMPOTENCY_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;
        Ok(claimed)
    }

    async fn context_append(
        &self,
        context_key: &str,
        event: &Event,
        max_events: u32,
        window_seconds: u64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let key = context_key_name(context_key);
        let member = serde_json::to_string(event)?;
        let score = timestamp_score(event.timestamp);
        let min_score = timestamp_score(Utc::now()) - (window_seconds as f64 * 1000.0);

        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(score)
            .arg(&member)
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(min_score)
            .cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(-(max_events as isize) - 1)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(window_seconds + 60)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn context_read(&self, context_key: &str) -> StoreResult<Vec<Event>> {
        let mut conn = self.conn.clone();
        let key = context_key_name(context_key);
        let raw: Vec<String> = conn.zrange(&key, 0, -1).await?;
        let events = raw
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<Result<Vec<Event>, _>>()?;
        Ok(events)
    }

    async fn rules_version(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let v: Option<u64> = conn.get(RULES_VERSION_KEY).await?;
        Ok(v.unwrap_or(0))
    }

    async fn rules_bump_version(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let v: u64 = conn.incr(RULES_VERSION_KEY, 1).await?;
        Ok(v)
    }

    async fn rules_put(&self, rule: &Rule) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(rule)?;
        conn.set::<_, _, ()>(rules_detail_key(&rule.rule_id), payload)
            .await?;
        Ok(())
    }

    async fn rules_get(&self, rule_id: &str) -> StoreResult<Option<Rule>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(rules_detail_key(rule_id)).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn rules_delete(&self, rule_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(rules_detail_key(rule_id)).await?;
        Ok(())
    }

    async fn rules_index_add(&self, event_type: &str, rule_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(rules_index_key(event_type), rule_id)
            .await?;
        Ok(())
    }

    async fn rules_index_remove(&self, event_type: &str, rule_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(rules_index_key(event_type), rule_id)
            .await?;
        Ok(())
    }

    async fn rules_index_get(&self, event_type: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(rules_index_key(event_type)).await?;
        Ok(ids)
    }

    async fn rules_publish_update(&self, action: &str, rule_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let message = format!("{action}:{rule_id}");
        conn.publish::<_, _, ()>(RULES_UPDATE_CHANNEL, message)
            .await?;
        Ok(())
    }

    async fn llm_cache_get(&self, rule_id: &str, context_hash: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let v: Option<String> = conn.get(llm_cache_key(rule_id, context_hash)).await?;
        Ok(v)
    }

    async fn llm_cache_put(
        &self,
        rule_id: &str,
        context_hash: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(llm_cache_key(rule_id, context_hash), value, ttl_seconds)
            .await?;
        Ok(())
    }

    async fn batch_append(
        &self,
        rule_id: &str,
        context_key: &str,
        event_ref: &EventRef,
    ) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let key = batch_key(rule_id, context_key);
        let payload = serde_json::to_string(event_ref)?;
        let len: u64 = conn.rpush(&key, payload).await?;
        Ok(len)
    }

    async fn batch_snapshot_and_clear(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Vec<EventRef>> {
        let mut conn = self.conn.clone();
        let key = batch_key(rule_id, context_key);
        let items: Vec<String> = Script::new(SNAPSHOT_AND_CLEAR_SCRIPT)
            .key(&key)
            .invoke_async(&mut conn)
            .await?;
        let refs = items
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<Result<Vec<EventRef>, _>>()?;
        Ok(refs)
    }

    async fn batch_since_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let v: Option<i64> = conn.get(batch_since_key(rule_id, context_key)).await?;
        Ok(v.map(|millis| {
            Utc.timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now)
        }))
    }

    async fn batch_since_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(batch_since_key(rule_id, context_key), ts.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn batch_since_clear(&self, rule_id: &str, context_key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(batch_since_key(rule_id, context_key))
            .await?;
        Ok(())
    }

    async fn interval_last_get(
        &self,
        rule_id: &str,
        context_key: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let v: Option<i64> = conn.get(interval_last_key(rule_id, context_key)).await?;
        Ok(v.map(|millis| {
            Utc.timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now)
        }))
    }

    async fn interval_last_set(
        &self,
        rule_id: &str,
        context_key: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(
            interval_last_key(rule_id, context_key),
            ts.timestamp_millis(),
        )
        .await?;
        Ok(())
    }

    async fn interval_lock_try_acquire(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
        ttl_seconds: u64,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let key = interval_lock_key(rule_id, context_key);
        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;
        Ok(acquired)
    }

    async fn interval_lock_release(
        &self,
        rule_id: &str,
        context_key: &str,
        token: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let key = interval_lock_key(rule_id, context_key);
        let released: i64 = Script::new(RELEASE_LOCK_SCRIPT)
            .key(&key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn notify_dedup_try_set(&self, dedup_key: &str, cooldown_seconds: u64) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let key = notify_dedup_key(dedup_key);
        let set: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(cooldown_seconds)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;
        Ok(set)
    }

    async fn notify_rate_incr(&self, rule_id: &str, minute_bucket: i64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let key = notify_rate_key(rule_id, minute_bucket);
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(&key, NOTIFY_RATE_TTL_SECONDS as i64)
                .await?;
        }
        Ok(count)
    }

    async fn notify_queue_push(&self, task: &NotificationTask) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(task)?;
        conn.lpush::<_, _, ()>(NOTIFY_QUEUE_KEY, payload).await?;
        Ok(())
    }

    async fn notify_queue_pop(&self, timeout_seconds: u64) -> StoreResult<Option<NotificationTask>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> =
            conn.brpop(NOTIFY_QUEUE_KEY, timeout_seconds as f64).await?;
        Ok(result
            .map(|(_, payload)| serde_json::from_str(&payload))
            .transpose()?)
    }

    async fn notify_dead_letter_push(&self, task: &NotificationTask) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(task)?;
        conn.lpush::<_, _, ()>(NOTIFY_DEAD_LETTER_KEY, payload)
            .await?;
        Ok(())
    }
}

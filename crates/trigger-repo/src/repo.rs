use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use trigger_store::StateStore;
use trigger_types::Rule;

use crate::error::{RepoError, RepoResult};

#[derive(Default)]
struct Snapshot {
    version: u64,
    by_event_type: HashMap<String, Vec<Rule>>,
}

/// Rule cache over [`StateStore`], refreshed whenever the store's rule
/// version counter moves past the locally cached one.
///
/// The version compare is the correctness mechanism; the pub/sub
/// invalidation hint in [`RuleRepository::watch_invalidations`] only
/// shaves latency off the next refresh, never substitutes for it.
pub struct RuleRepository<S: StateStore> {
    store: Arc<S>,
    snapshot: RwLock<Snapshot>,
}

impl<S: StateStore> RuleRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Force the next call to `match_event` to refetch regardless of
    /// the version counter — called when the pub/sub hint fires.
    pub async fn invalidate(&self) {
        self.snapshot.write().await.version = 0;
    }

    async fn refresh_if_stale(&self) -> RepoResult<()> {
        let remote_version = self.store.rules_version().await?;
        let local_version = self.snapshot.read().await.version;
        if remote_version == local_version && local_version != 0 {
            return Ok(());
        }

        // There's no "list all event types" primitive, so a stale
        // snapshot is handled by dropping the per-event-type cache
        // entirely; `rules_for_event_type` repopulates each event type
        // lazily, on next sight, straight from the store.
        let mut snapshot = self.snapshot.write().await;
        snapshot.version = remote_version.max(1);
        snapshot.by_event_type.clear();
        Ok(())
    }

    async fn rules_for_event_type(&self, event_type: &str) -> RepoResult<Vec<Rule>> {
        self.refresh_if_stale().await?;

        if let Some(rules) = self.snapshot.read().await.by_event_type.get(event_type) {
            return Ok(rules.clone());
        }

        let rule_ids = self.store.rules_index_get(event_type).await?;
        let mut rules = Vec::with_capacity(rule_ids.len());
        for rule_id in rule_ids {
            if let Some(rule) = self.store.rules_get(&rule_id).await? {
                rules.push(rule);
            }
        }

        self.snapshot
            .write()
            .await
            .by_event_type
            .insert(event_type.to_string(), rules.clone());
        Ok(rules)
    }

    /// Enabled rules matching `event_type` and `context_key`, sorted by
    /// `priority` descending, ties broken by `rule_id` ascending.
    pub async fn match_event(&self, event_type: &str, context_key: &str) -> RepoResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules_for_event_type(event_type)
            .await?
            .into_iter()
            .filter(|r| r.enabled && r.matches_context_key(context_key))
            .collect();

        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        Ok(rules)
    }

    /// Validate and write a rule, bumping the version counter and
    /// indexing it under every `event_type` it names.
    ///
    /// `rule_config.kind` vs. populated sub-config is already guaranteed
    /// by `RuleConfig`'s type — the only runtime invariant left to
    /// check here is that a rule names at least one event type.
    pub async fn put(&self, rule: &Rule) -> RepoResult<()> {
        if rule.event_types.is_empty() {
            return Err(RepoError::EmptyEventTypes(rule.rule_id.clone()));
        }

        self.store.rules_put(rule).await?;
        for event_type in &rule.event_types {
            self.store.rules_index_add(event_type, &rule.rule_id).await?;
        }
        self.store.rules_bump_version().await?;
        self.store.rules_publish_update("put", &rule.rule_id).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn delete(&self, rule: &Rule) -> RepoResult<()> {
        self.store.rules_delete(&rule.rule_id).await?;
        for event_type in &rule.event_types {
            self.store
                .rules_index_remove(event_type, &rule.rule_id)
                .await?;
        }
        self.store.rules_bump_version().await?;
        self.store
            .rules_publish_update("delete", &rule.rule_id)
            .await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn set_enabled(&self, rule: &mut Rule, enabled: bool) -> RepoResult<()> {
        rule.enabled = enabled;
        rule.updated_at = chrono::Utc::now();
        self.put(rule).await
    }
}

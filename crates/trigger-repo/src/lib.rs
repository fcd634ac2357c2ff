//! Rule Repository: a version-checked cache over [`trigger_store`]
//! exposing glob+priority rule matching and a validated write path.

mod error;
mod repo;
mod watch;

pub use error::{RepoError, RepoResult};
pub use repo::RuleRepository;
pub use watch::{watch_invalidations, InvalidationHint};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;
    use trigger_store::InMemoryStore;
    use trigger_types::{
        LLMConfig, NotifyPolicy, PreFilter, RateLimit, Rule, RuleConfig, TriggerMode,
    };

    use super::*;

    fn sample_rule(rule_id: &str, priority: i64, context_keys: Vec<String>) -> Rule {
        let now = Utc::now();
        Rule {
            rule_id: rule_id.to_string(),
            name: rule_id.to_string(),
            description: String::new(),
            enabled: true,
            priority,
            event_types: HashSet::from(["trade.profit".to_string()]),
            context_keys,
            rule_config: RuleConfig::Expression {
                pre_filter: PreFilter {
                    expression: "amount > 0".to_string(),
                },
            },
            notify_policy: NotifyPolicy {
                targets: vec![],
                rate_limit: RateLimit {
                    max_per_minute: 10,
                    cooldown_seconds: 60,
                },
            },
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn match_event_filters_by_context_key_and_sorts_by_priority() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);

        repo.put(&sample_rule("low", 1, vec!["acct:*".into()]))
            .await
            .unwrap();
        repo.put(&sample_rule("high", 10, vec!["acct:*".into()]))
            .await
            .unwrap();
        repo.put(&sample_rule("other-key", 5, vec!["user:*".into()]))
            .await
            .unwrap();

        let matched = repo.match_event("trade.profit", "acct:1").await.unwrap();
        let ids: Vec<_> = matched.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn disabled_rules_are_excluded() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);

        let mut rule = sample_rule("r1", 1, vec![]);
        repo.put(&rule).await.unwrap();
        repo.set_enabled(&mut rule, false).await.unwrap();

        let matched = repo.match_event("trade.profit", "anything").await.unwrap();
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn empty_context_keys_matches_every_context() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);
        repo.put(&sample_rule("r1", 1, vec![])).await.unwrap();

        let matched = repo.match_event("trade.profit", "acct:whatever").await.unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test]
    async fn put_rejects_rule_with_no_event_types() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);
        let mut rule = sample_rule("r1", 1, vec![]);
        rule.event_types.clear();

        let err = repo.put(&rule).await.unwrap_err();
        assert!(matches!(err, RepoError::EmptyEventTypes(_)));
    }

    #[tokio::test]
    async fn delete_removes_rule_from_future_matches() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);
        let rule = sample_rule("r1", 1, vec![]);
        repo.put(&rule).await.unwrap();
        assert_eq!(repo.match_event("trade.profit", "k").await.unwrap().len(), 1);

        repo.delete(&rule).await.unwrap();
        assert!(repo.match_event("trade.profit", "k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn llm_rule_round_trips_through_put_and_match() {
        let store = Arc::new(InMemoryStore::new());
        let repo = RuleRepository::new(store);
        let mut rule = sample_rule("llm-1", 1, vec![]);
        rule.rule_config = RuleConfig::Llm {
            llm_config: LLMConfig {
                description: "watch for suspicious activity".to_string(),
                trigger_mode: TriggerMode::Realtime,
                confidence_threshold: 0.8,
            },
        };
        repo.put(&rule).await.unwrap();

        let matched = repo.match_event("trade.profit", "k").await.unwrap();
        assert_eq!(matched.len(), 1);
        assert!(matched[0].rule_config.llm_config().is_some());
    }
}

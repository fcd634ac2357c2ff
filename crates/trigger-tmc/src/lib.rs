//! Trigger Mode Controller: per-(rule, context_key) state machine
//! deciding whether an event skips, pends, or triggers LLM inference,
//! for the three trigger modes in spec.md §4.5.
//!
//! All authoritative state lives in [`trigger_store::StateStore`]
//! behind atomic primitives (batch snapshot-and-clear, interval
//! compare-and-swap lock) — this crate owns only the decision logic
//! and the periodic-sweep entry points that keep the batch-timeout and
//! interval-empty-window bounds honest independent of event arrival.

mod controller;
mod error;
mod types;

pub use controller::TriggerModeController;
pub use error::{TmcError, TmcResult};
pub use types::{AnalysisPayload, Decision, IntervalCompletion, SweptBatch, SweptInterval};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use trigger_store::InMemoryStore;
    use trigger_types::{
        Event, LLMConfig, NotifyPolicy, PreFilter, RateLimit, Rule, RuleConfig, TriggerMode,
    };

    use super::*;

    fn llm_rule(rule_id: &str, trigger_mode: TriggerMode) -> Rule {
        let now = Utc::now();
        Rule {
            rule_id: rule_id.to_string(),
            name: rule_id.to_string(),
            description: String::new(),
            enabled: true,
            priority: 0,
            event_types: std::collections::HashSet::from(["trade.profit".to_string()]),
            context_keys: vec![],
            rule_config: RuleConfig::Llm {
                llm_config: LLMConfig {
                    description: "watch for suspicious trades".to_string(),
                    trigger_mode,
                    confidence_threshold: 0.7,
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

    fn event(id: &str, context_key: &str, ts: chrono::DateTime<Utc>) -> Event {
        Event {
            event_id: id.to_string(),
            event_type: "trade.profit".to_string(),
            context_key: context_key.to_string(),
            timestamp: ts,
            data: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn realtime_always_triggers() {
        let store = Arc::new(InMemoryStore::new());
        let tmc = TriggerModeController::new(store);
        let rule = llm_rule("r1", TriggerMode::Realtime);

        for i in 0..5 {
            let decision = tmc
                .decide(&rule, &event(&format!("e{i}"), "k", Utc::now()))
                .await
                .unwrap();
            assert!(matches!(
                decision,
                Decision::Trigger {
                    payload: AnalysisPayload::Window,
                    completion: None
                }
            ));
        }
    }

    #[tokio::test]
    async fn batch_triggers_at_size_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let tmc = TriggerModeController::new(store);
        let rule = llm_rule(
            "r1",
            TriggerMode::Batch {
                batch_size: 3,
                max_wait_seconds: 30,
            },
        );
        let now = Utc::now();

        for i in 0..2 {
            let decision = tmc.decide(&rule, &event(&format!("e{i}"), "k", now)).await.unwrap();
            assert_eq!(decision, Decision::Pending);
        }

        let decision = tmc.decide(&rule, &event("e2", "k", now)).await.unwrap();
        match decision {
            Decision::Trigger {
                payload: AnalysisPayload::Batch(events),
                completion: None,
            } => assert_eq!(events.len(), 3),
            other => panic!("expected batch trigger, got {other:?}"),
        }

        // Accumulator cleared after flush.
        let decision = tmc.decide(&rule, &event("e3", "k", now)).await.unwrap();
        assert_eq!(decision, Decision::Pending);
    }

    #[tokio::test]
    async fn batch_sweep_flushes_after_timeout_with_no_new_events() {
        let store = Arc::new(InMemoryStore::new());
        let tmc = TriggerModeController::new(store);
        let rule = llm_rule(
            "r1",
            TriggerMode::Batch {
                batch_size: 5,
                max_wait_seconds: 30,
            },
        );
        let stale = Utc::now() - Duration::seconds(60);

        for i in 0..3 {
            tmc.decide(&rule, &event(&format!("e{i}"), "k", stale))
                .await
                .unwrap();
        }

        let flushed = tmc.sweep_batches().await.unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].events.len(), 3);
        assert_eq!(flushed[0].rule_id, "r1");
        assert_eq!(flushed[0].context_key, "k");

        // A second sweep finds nothing — already flushed.
        assert!(tmc.sweep_batches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interval_skips_within_the_window_then_triggers_again() {
        let store = Arc::new(InMemoryStore::new());
        let tmc = TriggerModeController::new(store);
        let rule = llm_rule("r1", TriggerMode::Interval { interval_seconds: 30 });
        let now = Utc::now();

        let first = tmc.decide(&rule, &event("e0", "k", now)).await.unwrap();
        let completion = match first {
            Decision::Trigger {
                payload: AnalysisPayload::Window,
                completion: Some(c),
            } => c,
            other => panic!("expected interval trigger, got {other:?}"),
        };

        for i in 1..10 {
            let decision = tmc.decide(&rule, &event(&format!("e{i}"), "k", now)).await.unwrap();
            assert_eq!(decision, Decision::Skip);
        }

        tmc.complete_interval(completion).await.unwrap();

        // Still within interval right after completion.
        let decision = tmc.decide(&rule, &event("e10", "k", now)).await.unwrap();
        assert_eq!(decision, Decision::Skip);
    }

    #[tokio::test]
    async fn interval_lock_prevents_two_workers_from_both_triggering() {
        let store = Arc::new(InMemoryStore::new());
        let tmc_a = TriggerModeController::new(Arc::clone(&store));
        let tmc_b = TriggerModeController::new(store);
        let rule = llm_rule("r1", TriggerMode::Interval { interval_seconds: 30 });
        let now = Utc::now();

        let a = tmc_a.decide(&rule, &event("e0", "k", now)).await.unwrap();
        let b = tmc_b.decide(&rule, &event("e0", "k", now)).await.unwrap();

        let triggers = [&a, &b]
            .iter()
            .filter(|d| matches!(d, Decision::Trigger { .. }))
            .count();
        assert_eq!(triggers, 1, "exactly one worker should win the lock");
    }

    #[tokio::test]
    async fn interval_sweep_fires_empty_window_after_elapsed_clock() {
        let store = Arc::new(InMemoryStore::new());
        let tmc = TriggerModeController::new(Arc::clone(&store));
        let rule = llm_rule("r1", TriggerMode::Interval { interval_seconds: 10 });
        let now = Utc::now();

        // First event registers (rule, "k") as active and triggers
        // immediately (no prior `last`).
        let first = tmc.decide(&rule, &event("e0", "k", now)).await.unwrap();
        let completion = match first {
            Decision::Trigger { completion: Some(c), .. } => c,
            other => panic!("expected trigger, got {other:?}"),
        };
        tmc.complete_interval(completion).await.unwrap();

        // Immediately afterwards, nothing has elapsed yet.
        assert!(tmc.sweep_intervals().await.unwrap().is_empty());

        // Backdate `last` past the interval, as if real time had
        // passed with no new event arriving for this context key.
        store
            .interval_last_set("r1", "k", now - Duration::seconds(60))
            .await
            .unwrap();

        let fired = tmc.sweep_intervals().await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, "r1");
        assert_eq!(fired[0].context_key, "k");

        tmc.complete_interval(fired[0].completion.clone()).await.unwrap();
        assert!(tmc.sweep_intervals().await.unwrap().is_empty());
    }
}

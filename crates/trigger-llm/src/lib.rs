//! LLM Engine (spec.md §4.4): cache lookup, context summarization,
//! prompt assembly, OpenAI-compatible chat-completion call, structured
//! response parsing, and confidence clamp/gate — wired together as
//! [`engine::LlmEngine`].

mod client;
mod engine;
mod error;
mod parse;
mod prompt;
mod summary;

pub use client::{ChatCompletionClient, TransportErrorKind};
pub use engine::{LlmEngine, LlmEngineConfig};
pub use error::{LlmError, LlmResult};
pub use parse::{parse_llm_response, LlmOutcome};
pub use prompt::{build_messages, ChatMessage};
pub use summary::{ContextSummary, EventSummary};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use trigger_store::InMemoryStore;
    use trigger_types::{
        Event, LLMConfig, NotifyPolicy, RateLimit, Rule, RuleConfig, TriggerMode,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn llm_rule(threshold: f64) -> Rule {
        Rule {
            rule_id: "r1".to_string(),
            name: "suspicious activity".to_string(),
            description: String::new(),
            enabled: true,
            priority: 0,
            event_types: HashSet::from(["trade.executed".to_string()]),
            context_keys: vec!["*".to_string()],
            rule_config: RuleConfig::Llm {
                llm_config: LLMConfig {
                    description: "Flag unusual trading activity.".to_string(),
                    trigger_mode: TriggerMode::Realtime,
                    confidence_threshold: threshold,
                },
            },
            notify_policy: NotifyPolicy {
                targets: vec![],
                rate_limit: RateLimit {
                    max_per_minute: 10,
                    cooldown_seconds: 0,
                },
            },
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event() -> Event {
        Event {
            event_id: "e1".to_string(),
            event_type: "trade.executed".to_string(),
            context_key: "account:1".to_string(),
            timestamp: Utc::now(),
            data: Default::default(),
        }
    }

    async fn engine_against(server: &MockServer, store: Arc<InMemoryStore>) -> LlmEngine<InMemoryStore> {
        LlmEngine::new(
            store,
            LlmEngineConfig {
                base_url: server.uri(),
                api_key: "test-key".to_string(),
                model: "gpt-test".to_string(),
                timeout: Duration::from_secs(5),
            },
        )
    }

    fn chat_response(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        }))
    }

    #[tokio::test]
    async fn triggers_when_confidence_meets_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_response(
                r#"{"should_trigger": true, "confidence": 0.85, "reason": "looks anomalous"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);

        let outcome = engine.evaluate(&rule, &event(), &[], None).await.unwrap();
        assert!(outcome.should_trigger);
        assert_eq!(outcome.confidence, 0.85);
    }

    #[tokio::test]
    async fn does_not_trigger_below_threshold_even_if_model_says_so() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_response(
                r#"{"should_trigger": true, "confidence": 0.5, "reason": "maybe"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);

        let outcome = engine.evaluate(&rule, &event(), &[], None).await.unwrap();
        assert!(!outcome.should_trigger);
        assert_eq!(outcome.confidence, 0.5);
    }

    #[tokio::test]
    async fn clamps_out_of_range_confidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_response(
                r#"{"should_trigger": true, "confidence": 1.4, "reason": "very sure"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);

        let outcome = engine.evaluate(&rule, &event(), &[], None).await.unwrap();
        assert_eq!(outcome.confidence, 1.0);
        assert!(outcome.should_trigger);
    }

    #[tokio::test]
    async fn second_call_with_same_context_hits_cache_and_skips_the_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_response(
                r#"{"should_trigger": true, "confidence": 0.9, "reason": "matches"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);
        let evt = event();

        let first = engine.evaluate(&rule, &evt, &[], None).await.unwrap();
        let second = engine.evaluate(&rule, &evt, &[], None).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn malformed_model_response_yields_non_triggering_outcome_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_response("I cannot comply with that request."))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);

        let outcome = engine.evaluate(&rule, &event(), &[], None).await.unwrap();
        assert!(!outcome.should_trigger);
        assert!(outcome.reason.starts_with("parse_error:"));
    }

    #[tokio::test]
    async fn transport_failure_yields_non_triggering_outcome_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let engine = engine_against(&server, store).await;
        let rule = llm_rule(0.7);

        let outcome = engine.evaluate(&rule, &event(), &[], None).await.unwrap();
        assert!(!outcome.should_trigger);
        assert!(outcome.reason.starts_with("llm_error:"));
    }
}

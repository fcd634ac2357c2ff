use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use trigger_store::StateStore;
use trigger_types::{Event, Rule};

use crate::client::ChatCompletionClient;
use crate::error::LlmResult;
use crate::parse::{parse_llm_response, LlmOutcome};
use crate::prompt::build_messages;
use crate::summary::ContextSummary;

const CACHE_TTL_SECONDS: u64 = 60;

/// Connection details for the OpenAI-compatible endpoint the engine
/// calls — everything spec.md §6 names as an env var for the LLM
/// service.
pub struct LlmEngineConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

/// LLM Engine (spec.md §4.4): cache lookup, prompt assembly, model
/// call, structured-JSON parse, confidence clamp/gate, cache the
/// result — all seven steps as one entry point.
pub struct LlmEngine<S: StateStore> {
    store: Arc<S>,
    client: ChatCompletionClient,
}

impl<S: StateStore> LlmEngine<S> {
    pub fn new(store: Arc<S>, config: LlmEngineConfig) -> Self {
        let client =
            ChatCompletionClient::new(config.base_url, config.api_key, config.model, config.timeout);
        Self { store, client }
    }

    /// Evaluate `rule` against `event` in light of `window` (the
    /// context window read from `trigger-window`) and, for batch-mode
    /// rules, `batch_events` — the specific events the trigger mode
    /// controller flushed as "events under analysis" (spec.md §4.5).
    ///
    /// `rule.rule_config` must carry an `LLMConfig` (an `llm` or
    /// `hybrid` rule); callers are expected to have already resolved
    /// that before reaching the LLM Engine.
    pub async fn evaluate(
        &self,
        rule: &Rule,
        event: &Event,
        window: &[Event],
        batch_events: Option<&[Event]>,
    ) -> LlmResult<LlmOutcome> {
        let Some(llm_config) = rule.rule_config.llm_config() else {
            return Ok(LlmOutcome {
                should_trigger: false,
                confidence: 0.0,
                reason: "parse_error:rule has no llm_config".to_string(),
            });
        };

        let summary = ContextSummary::build(window, batch_events);
        let context_hash = hash_context(&summary, event);

        if let Some(cached) = self.store.llm_cache_get(&rule.rule_id, &context_hash).await? {
            if let Ok(outcome) = serde_json::from_str::<CachedOutcome>(&cached) {
                return Ok(outcome.into());
            }
        }

        let messages = build_messages(&llm_config.description, &summary, event);

        let content = match self.client.complete(&messages).await {
            Ok(content) => content,
            Err(kind) => {
                return Ok(LlmOutcome {
                    should_trigger: false,
                    confidence: 0.0,
                    reason: format!("llm_error:{kind}"),
                })
            }
        };

        let parsed = match parse_llm_response(&content) {
            Ok(outcome) => outcome,
            Err(detail) => {
                return Ok(LlmOutcome {
                    should_trigger: false,
                    confidence: 0.0,
                    reason: format!("parse_error:{detail}"),
                })
            }
        };

        let threshold = llm_config.clamped_threshold();
        let confidence = parsed.confidence.clamp(0.0, 1.0);
        let should_trigger = parsed.should_trigger && confidence >= threshold;
        let outcome = LlmOutcome {
            should_trigger,
            confidence,
            reason: parsed.reason,
        };

        let cached = serde_json::to_string(&CachedOutcome::from(&outcome))?;
        self.store
            .llm_cache_put(&rule.rule_id, &context_hash, &cached, CACHE_TTL_SECONDS)
            .await?;

        Ok(outcome)
    }
}

/// Wire shape for the cached verdict — identical fields to
/// [`LlmOutcome`], kept as a distinct type so the cache format isn't
/// silently coupled to `LlmOutcome`'s derives changing.
#[derive(serde::Serialize, serde::Deserialize)]
struct CachedOutcome {
    should_trigger: bool,
    confidence: f64,
    reason: String,
}

impl From<&LlmOutcome> for CachedOutcome {
    fn from(o: &LlmOutcome) -> Self {
        CachedOutcome {
            should_trigger: o.should_trigger,
            confidence: o.confidence,
            reason: o.reason.clone(),
        }
    }
}

impl From<CachedOutcome> for LlmOutcome {
    fn from(c: CachedOutcome) -> Self {
        LlmOutcome {
            should_trigger: c.should_trigger,
            confidence: c.confidence,
            reason: c.reason,
        }
    }
}

fn hash_context(summary: &ContextSummary, event: &Event) -> String {
    let mut hasher = Sha256::new();
    if let Ok(summary_json) = serde_json::to_vec(summary) {
        hasher.update(summary_json);
    }
    if let Ok(event_json) = serde_json::to_vec(event) {
        hasher.update(event_json);
    }
    format!("{:x}", hasher.finalize())
}

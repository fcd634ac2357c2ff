use std::sync::Arc;

use chrono::Utc;
use trigger_config::{trg_debug, trg_warn};
use trigger_expr::AstCache;
use trigger_llm::LlmEngine;
use trigger_notify::{EnqueueOutcome, NotificationGate};
use trigger_repo::RuleRepository;
use trigger_store::StateStore;
use trigger_tmc::{AnalysisPayload, Decision, SweptBatch, SweptInterval, TriggerModeController};
use trigger_types::{Event, ExecutionRecord, NotificationStatus, Rule, RuleConfig, Target};
use trigger_window::ContextWindowManager;

use crate::error::CoreResult;
use crate::metrics::TriggerMetrics;
use crate::sink::ExecutionSink;

/// Result of [`EventHandler::handle`] for one ingested event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// `event_id` was already processed within the idempotency window;
    /// the caller should ack and do nothing further.
    Duplicate,
    /// The event was processed; `fired_rule_ids` names every rule that
    /// fired, in evaluation order.
    Processed { fired_rule_ids: Vec<String> },
}

/// Rule Router + event handler (spec.md §4.6): the single entry point
/// that turns one ingested [`Event`] into zero or more fired
/// notifications, across all three rule kinds.
pub struct EventHandler<S: StateStore> {
    store: Arc<S>,
    repo: Arc<RuleRepository<S>>,
    window: ContextWindowManager<S>,
    tmc: Arc<TriggerModeController<S>>,
    llm: Arc<LlmEngine<S>>,
    notify_gate: NotificationGate<S>,
    expr_cache: AstCache,
    sink: Arc<dyn ExecutionSink>,
    metrics: Arc<TriggerMetrics>,
}

impl<S: StateStore> EventHandler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        repo: Arc<RuleRepository<S>>,
        window: ContextWindowManager<S>,
        tmc: Arc<TriggerModeController<S>>,
        llm: Arc<LlmEngine<S>>,
        sink: Arc<dyn ExecutionSink>,
        metrics: Arc<TriggerMetrics>,
    ) -> Self {
        let notify_gate = NotificationGate::new(Arc::clone(&store));
        Self {
            store,
            repo,
            window,
            tmc,
            llm,
            notify_gate,
            expr_cache: AstCache::new(),
            sink,
            metrics,
        }
    }

    /// Run the full per-event sequence of spec.md §4.6. `Err` means a
    /// systemic failure (store unreachable) — the broker adapter nacks
    /// with requeue; any other failure mode (malformed rule expression,
    /// LLM transport error) is absorbed per-rule and never reaches here.
    pub async fn handle(&self, event: &Event) -> CoreResult<HandleOutcome> {
        if !self.store.idempotency_claim(&event.event_id).await? {
            self.metrics.inc_duplicate();
            trg_debug!(ingest, event_id = %event.event_id, "duplicate event, skipping");
            return Ok(HandleOutcome::Duplicate);
        }
        self.metrics.inc_ingested();

        self.window.append(event).await?;

        let rules = self
            .repo
            .match_event(&event.event_type, &event.context_key)
            .await?;

        let mut fired_rule_ids = Vec::new();
        for rule in &rules {
            self.metrics.inc_rule_evaluation(&rule.rule_id);
            let outcome = self.evaluate_rule(rule, event).await?;
            if outcome.fired {
                fired_rule_ids.push(rule.rule_id.clone());
            }
        }

        Ok(HandleOutcome::Processed { fired_rule_ids })
    }

    async fn evaluate_rule(&self, rule: &Rule, event: &Event) -> CoreResult<RuleOutcome> {
        let outcome = match &rule.rule_config {
            RuleConfig::Expression { pre_filter } => self.evaluate_expression(rule, event, &pre_filter.expression),
            RuleConfig::Llm { .. } => self.evaluate_llm(rule, event).await?,
            RuleConfig::Hybrid { pre_filter, .. } => {
                let pre = self.evaluate_expression(rule, event, &pre_filter.expression);
                if !pre.fired {
                    pre
                } else {
                    self.evaluate_llm(rule, event).await?
                }
            }
        };

        self.finalize(rule, &event.context_key, &event.event_id, outcome).await
    }

    /// Fire/record the outcome of one rule evaluation, regardless of
    /// whether it came from a live event or a periodic sweep.
    async fn finalize(
        &self,
        rule: &Rule,
        context_key: &str,
        event_id: &str,
        mut outcome: RuleOutcome,
    ) -> CoreResult<RuleOutcome> {
        if outcome.fired {
            self.metrics.inc_rule_fire(&rule.rule_id);
            outcome.statuses = self.fire(rule, context_key, &outcome.reason).await?;
        }

        self.sink.record(&ExecutionRecord {
            rule_id: rule.rule_id.clone(),
            context_key: context_key.to_string(),
            event_id: event_id.to_string(),
            fired: outcome.fired,
            confidence: outcome.confidence,
            reasoning: Some(outcome.reason.clone()),
            statuses: outcome.statuses.clone(),
            evaluated_at: Utc::now(),
        });

        Ok(outcome)
    }

    /// Process a batch flushed by [`TriggerModeController::sweep_batches`]
    /// on a timeout, with no new event to anchor it (spec.md §4.5/§9's
    /// delay-bound requirement). The most recent event in the context
    /// window stands in as the anchor; a window with nothing in it has
    /// nothing to analyze and is skipped.
    pub async fn handle_swept_batch(&self, batch: SweptBatch) -> CoreResult<()> {
        let Some(rule) = self.store.rules_get(&batch.rule_id).await? else {
            return Ok(());
        };
        let window_events = self.window.read(&batch.context_key).await?;
        let Some(anchor) = window_events.last().cloned() else {
            return Ok(());
        };

        self.metrics.inc_llm_call();
        let ids: std::collections::HashSet<&str> =
            batch.events.iter().map(|r| r.event_id.as_str()).collect();
        let batch_events: Vec<Event> = window_events
            .iter()
            .filter(|e| ids.contains(e.event_id.as_str()))
            .cloned()
            .collect();

        let llm_outcome = self
            .llm
            .evaluate(&rule, &anchor, &window_events, Some(&batch_events))
            .await?;
        if llm_outcome.reason.starts_with("llm_error:") {
            self.metrics.inc_llm_error();
        }

        let outcome = RuleOutcome {
            fired: llm_outcome.should_trigger,
            confidence: Some(llm_outcome.confidence),
            reason: llm_outcome.reason,
            statuses: Vec::new(),
        };
        self.finalize(&rule, &batch.context_key, &anchor.event_id, outcome).await?;
        Ok(())
    }

    /// Process an interval-mode fire from
    /// [`TriggerModeController::sweep_intervals`] — the "empty window"
    /// case where the clock elapsed with no new event arriving.
    pub async fn handle_swept_interval(&self, interval: SweptInterval) -> CoreResult<()> {
        let Some(rule) = self.store.rules_get(&interval.rule_id).await? else {
            self.tmc.complete_interval(interval.completion).await?;
            return Ok(());
        };
        let window_events = self.window.read(&interval.context_key).await?;
        let Some(anchor) = window_events.last().cloned() else {
            self.tmc.complete_interval(interval.completion).await?;
            return Ok(());
        };

        self.metrics.inc_llm_call();
        let result = self.llm.evaluate(&rule, &anchor, &window_events, None).await;
        self.tmc.complete_interval(interval.completion).await?;
        let llm_outcome = result?;
        if llm_outcome.reason.starts_with("llm_error:") {
            self.metrics.inc_llm_error();
        }

        let outcome = RuleOutcome {
            fired: llm_outcome.should_trigger,
            confidence: Some(llm_outcome.confidence),
            reason: llm_outcome.reason,
            statuses: Vec::new(),
        };
        self.finalize(&rule, &interval.context_key, &anchor.event_id, outcome).await?;
        Ok(())
    }

    /// `pre_filter.expression` evaluated over `event.data` (spec.md
    /// §4.1, §4.6 step 4). An evaluation error is logged and treated
    /// as non-fire for this rule only — it never aborts sibling rule
    /// evaluation (spec.md §4.6, §7).
    fn evaluate_expression(&self, rule: &Rule, event: &Event, expression: &str) -> RuleOutcome {
        let ast = match self.expr_cache.get_or_parse(expression) {
            Ok(ast) => ast,
            Err(e) => {
                self.metrics.inc_rule_error(&rule.rule_id);
                trg_warn!(rule, rule_id = %rule.rule_id, error = %e, "expression parse error");
                return RuleOutcome::not_fired(format!("expression_error:{e}"));
            }
        };

        match trigger_expr::eval_bool(&ast, event) {
            Ok(true) => RuleOutcome::fired("expression matched".to_string()),
            Ok(false) => RuleOutcome::not_fired("expression did not match".to_string()),
            Err(e) => {
                self.metrics.inc_rule_error(&rule.rule_id);
                trg_warn!(rule, rule_id = %rule.rule_id, error = %e, "expression evaluation error");
                RuleOutcome::not_fired(format!("expression_error:{e}"))
            }
        }
    }

    /// `llm`/`hybrid` branch: trigger-mode decision, then (iff
    /// triggered) the LLM call itself (spec.md §4.5, §4.6 step 4).
    async fn evaluate_llm(&self, rule: &Rule, event: &Event) -> CoreResult<RuleOutcome> {
        match self.tmc.decide(rule, event).await? {
            Decision::Skip => {
                self.metrics.inc_tmc_skip();
                Ok(RuleOutcome::not_fired("tmc_skip".to_string()))
            }
            Decision::Pending => {
                self.metrics.inc_tmc_pending();
                Ok(RuleOutcome::not_fired("tmc_pending".to_string()))
            }
            Decision::Trigger { payload, completion } => {
                self.metrics.inc_tmc_trigger();
                self.metrics.inc_llm_call();

                let window_events = self.window.read(&event.context_key).await?;
                let batch_events = match &payload {
                    AnalysisPayload::Window => None,
                    AnalysisPayload::Batch(refs) => {
                        let ids: std::collections::HashSet<&str> =
                            refs.iter().map(|r| r.event_id.as_str()).collect();
                        Some(
                            window_events
                                .iter()
                                .filter(|e| ids.contains(e.event_id.as_str()))
                                .cloned()
                                .collect::<Vec<_>>(),
                        )
                    }
                };

                let result = self
                    .llm
                    .evaluate(rule, event, &window_events, batch_events.as_deref())
                    .await;

                // The interval lock must be released whether the LLM
                // call succeeded or not — hold the error, release, then
                // propagate (spec.md §4.5: "update last and release
                // lock on completion").
                if let Some(completion) = completion {
                    self.tmc.complete_interval(completion).await?;
                }

                let llm_outcome = result?;
                if llm_outcome.reason.starts_with("llm_error:") {
                    self.metrics.inc_llm_error();
                }

                Ok(RuleOutcome {
                    fired: llm_outcome.should_trigger,
                    confidence: Some(llm_outcome.confidence),
                    reason: llm_outcome.reason,
                    statuses: Vec::new(),
                })
            }
        }
    }

    /// Enqueue a fired rule's notification across every configured
    /// target (spec.md §4.7), returning the per-target outcome for the
    /// execution record.
    async fn fire(
        &self,
        rule: &Rule,
        context_key: &str,
        reason: &str,
    ) -> CoreResult<Vec<(Target, NotificationStatus)>> {
        let message = format!("rule '{}' fired for context '{context_key}': {reason}", rule.name);

        let mut statuses = Vec::with_capacity(rule.notify_policy.targets.len());
        for target in &rule.notify_policy.targets {
            let enqueue_outcome = self
                .notify_gate
                .enqueue(&rule.rule_id, context_key, target, &message, &rule.notify_policy)
                .await?;

            let status = match enqueue_outcome {
                EnqueueOutcome::Queued => {
                    self.metrics.inc_notify_enqueued();
                    trg_debug!(notify, rule_id = %rule.rule_id, target = ?target, "notification enqueued");
                    NotificationStatus::Queued
                }
                EnqueueOutcome::DeduplicatedByCooldown | EnqueueOutcome::RateLimited => {
                    self.metrics.inc_notify_skipped();
                    trg_debug!(notify, rule_id = %rule.rule_id, target = ?target, outcome = ?enqueue_outcome, "notification skipped");
                    NotificationStatus::Skipped
                }
            };
            statuses.push((target.clone(), status));
        }
        Ok(statuses)
    }
}

/// Per-rule evaluation result, folded into the [`ExecutionRecord`]
/// regardless of whether the rule fired.
#[derive(Debug, Clone)]
struct RuleOutcome {
    fired: bool,
    confidence: Option<f64>,
    reason: String,
    statuses: Vec<(Target, NotificationStatus)>,
}

impl RuleOutcome {
    fn not_fired(reason: String) -> Self {
        Self {
            fired: false,
            confidence: None,
            reason,
            statuses: Vec::new(),
        }
    }

    fn fired(reason: String) -> Self {
        Self {
            fired: true,
            confidence: None,
            reason,
            statuses: Vec::new(),
        }
    }
}

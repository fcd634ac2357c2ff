use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Lock-free counters for the event-processing pipeline.
///
/// Mirrors the teacher's `RuntimeMetrics` shape (`wf_runtime::metrics`)
/// ported to this domain's own counters (spec.md §9 design notes name
/// no metrics surface, but the ambient observability stack carries
/// over regardless — see DESIGN.md). Per-rule breakdowns live behind a
/// single `RwLock` rather than a fixed label set, since rules are
/// created and deleted dynamically through the management API; the
/// per-rule atomics themselves are still lock-free on the hot path
/// once registered.
#[derive(Default)]
pub struct TriggerMetrics {
    events_ingested_total: AtomicU64,
    events_duplicate_total: AtomicU64,
    events_malformed_total: AtomicU64,

    rule_evaluations_total: RwLock<BTreeMap<String, AtomicU64>>,
    rule_fires_total: RwLock<BTreeMap<String, AtomicU64>>,
    rule_errors_total: RwLock<BTreeMap<String, AtomicU64>>,

    llm_calls_total: AtomicU64,
    llm_cache_hits_total: AtomicU64,
    llm_errors_total: AtomicU64,

    tmc_skip_total: AtomicU64,
    tmc_pending_total: AtomicU64,
    tmc_trigger_total: AtomicU64,

    notify_enqueued_total: AtomicU64,
    notify_skipped_total: AtomicU64,
}

impl TriggerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(map: &RwLock<BTreeMap<String, AtomicU64>>, rule_id: &str) {
        if let Some(v) = map.read().get(rule_id) {
            v.fetch_add(1, Ordering::Relaxed);
            return;
        }
        map.write()
            .entry(rule_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ingested(&self) {
        self.events_ingested_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate(&self) {
        self.events_duplicate_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.events_malformed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rule_evaluation(&self, rule_id: &str) {
        Self::bump(&self.rule_evaluations_total, rule_id);
    }

    pub fn inc_rule_fire(&self, rule_id: &str) {
        Self::bump(&self.rule_fires_total, rule_id);
    }

    pub fn inc_rule_error(&self, rule_id: &str) {
        Self::bump(&self.rule_errors_total, rule_id);
    }

    pub fn inc_llm_call(&self) {
        self.llm_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_cache_hit(&self) {
        self.llm_cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_error(&self) {
        self.llm_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tmc_skip(&self) {
        self.tmc_skip_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tmc_pending(&self) {
        self.tmc_pending_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tmc_trigger(&self) {
        self.tmc_trigger_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notify_enqueued(&self) {
        self.notify_enqueued_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notify_skipped(&self) {
        self.notify_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rule_evaluations(&self, rule_id: &str) -> u64 {
        self.rule_evaluations_total
            .read()
            .get(rule_id)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn rule_fires(&self, rule_id: &str) -> u64 {
        self.rule_fires_total
            .read()
            .get(rule_id)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// One-line summary for periodic `tracing` snapshots, same role as
    /// the teacher's `RuntimeMetrics::summary_line`.
    pub fn summary_line(&self) -> String {
        format!(
            "ingested={} duplicate={} malformed={} llm_calls={} llm_cache_hits={} llm_errors={} notify_enqueued={} notify_skipped={}",
            self.events_ingested_total.load(Ordering::Relaxed),
            self.events_duplicate_total.load(Ordering::Relaxed),
            self.events_malformed_total.load(Ordering::Relaxed),
            self.llm_calls_total.load(Ordering::Relaxed),
            self.llm_cache_hits_total.load(Ordering::Relaxed),
            self.llm_errors_total.load(Ordering::Relaxed),
            self.notify_enqueued_total.load(Ordering::Relaxed),
            self.notify_skipped_total.load(Ordering::Relaxed),
        )
    }
}

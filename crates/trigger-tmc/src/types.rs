use trigger_types::EventRef;

/// What the LLM Engine should analyze once a decision resolves to
/// [`Decision::Trigger`].
///
/// Resolves spec.md §9's open question ("exact shape of the batch
/// analysis payload is unspecified") by carrying event *references*
/// rather than full bodies — the LLM Engine re-reads the full context
/// window from `trigger-window` and folds the referenced events in as
/// the "events under analysis" framing. See DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    /// Realtime and interval modes: the whole context window is the
    /// payload, no extra references needed.
    Window,
    /// Batch mode: the flushed accumulator, in the order events were
    /// appended.
    Batch(Vec<EventRef>),
}

/// Token + coordinates needed to release an interval-mode advisory
/// lock once the LLM call it was acquired for has finished. Carried
/// out of `decide` instead of being handled internally, so the lock
/// covers the whole inference — not just the decision (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalCompletion {
    pub(crate) rule_id: String,
    pub(crate) context_key: String,
    pub(crate) token: String,
}

/// Outcome of [`crate::TriggerModeController::decide`] for one
/// (rule, context_key, event) triple.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// This event does not advance analysis for this rule right now.
    Skip,
    /// State was updated but the threshold for analysis hasn't been
    /// reached yet (batch mode only).
    Pending,
    /// Run the LLM now, over `payload`. `completion` is `Some` only
    /// for interval mode — call
    /// [`crate::TriggerModeController::complete_interval`] with it
    /// once the LLM call returns.
    Trigger {
        payload: AnalysisPayload,
        completion: Option<IntervalCompletion>,
    },
}

/// A batch flushed by [`crate::TriggerModeController::sweep_batches`]
/// because `max_wait_seconds` elapsed with no new event arriving.
#[derive(Debug, Clone, PartialEq)]
pub struct SweptBatch {
    pub rule_id: String,
    pub context_key: String,
    pub events: Vec<EventRef>,
}

/// An interval-mode fire produced by
/// [`crate::TriggerModeController::sweep_intervals`] for a clock that
/// elapsed with no new event arriving (the "empty-window" case).
#[derive(Debug, Clone, PartialEq)]
pub struct SweptInterval {
    pub rule_id: String,
    pub context_key: String,
    pub completion: IntervalCompletion,
}

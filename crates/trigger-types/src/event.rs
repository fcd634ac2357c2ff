use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scalar value carried in [`Event::data`].
///
/// Kept deliberately small (no nested maps/arrays) — the expression
/// engine only needs to compare against numbers, strings, bools, and
/// lists of those, and the LLM context summary only transmits
/// fields that round-trip cleanly through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<EventValue>),
}

/// A domain event ingested from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier used for idempotency checks on ingestion.
    pub event_id: String,
    /// Dotted event type, e.g. `"trade.profit"`.
    pub event_type: String,
    /// Low-cardinality dotted identifier grouping related events.
    pub context_key: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: HashMap<String, EventValue>,
}

impl Event {
    pub fn get(&self, field: &str) -> Option<&EventValue> {
        self.data.get(field)
    }

    pub fn as_ref(&self) -> EventRef {
        EventRef {
            event_id: self.event_id.clone(),
            context_key: self.context_key.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// A lightweight pointer to an [`Event`] — carried in batch
/// accumulators instead of the full event body, since the full event
/// already lives in the context window and doesn't need a second copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub event_id: String,
    pub context_key: String,
    pub timestamp: DateTime<Utc>,
}

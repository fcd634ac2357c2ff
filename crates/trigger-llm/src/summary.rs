use std::collections::HashMap;

use serde::Serialize;
use trigger_types::{Event, EventValue};

/// Substrings that mark a data field as unsafe to transmit to the
/// model — matched case-insensitively against the field name.
const SENSITIVE_FIELD_MARKERS: &[&str] = &["secret", "token", "password", "api_key", "apikey"];

/// One event's contribution to the context summary sent to the model
/// — timestamp, type, and a sanitized subset of `data`. Never
/// free-form prose (spec.md §4.4 step 2).
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: String,
    pub data: HashMap<String, EventValue>,
}

fn sanitize_fields(data: &HashMap<String, EventValue>) -> HashMap<String, EventValue> {
    data.iter()
        .filter(|(key, _)| {
            let lower = key.to_lowercase();
            !SENSITIVE_FIELD_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        EventSummary {
            timestamp: event.timestamp,
            event_type: event.event_type.clone(),
            data: sanitize_fields(&event.data),
        }
    }
}

/// Compact, chronologically ordered context handed to the model: the
/// recent window, plus (for batch mode) the specific events under
/// analysis in this call.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub window: Vec<EventSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_under_analysis: Option<Vec<EventSummary>>,
}

impl ContextSummary {
    pub fn build(window: &[Event], batch_events: Option<&[Event]>) -> Self {
        ContextSummary {
            window: window.iter().map(EventSummary::from).collect(),
            events_under_analysis: batch_events
                .map(|events| events.iter().map(EventSummary::from).collect()),
        }
    }
}

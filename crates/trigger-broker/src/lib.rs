//! AMQP ingress adapter (spec.md §6): a single-queue consumer that
//! decodes events and hands them to a [`MessageHandler`] under a
//! per-message deadline, acking or nack-requeueing per its
//! disposition. No live broker is required to construct the types in
//! this crate; [`EventConsumer::connect`] is the only part that talks
//! to a real AMQP server, so it is exercised in integration tests
//! against a running RabbitMQ rather than this crate's unit suite.

mod consumer;
mod error;

pub use consumer::{Disposition, EventConsumer, MessageHandler};
pub use error::{BrokerError, BrokerResult};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use trigger_types::Event;

    fn event() -> Event {
        Event {
            event_id: "e1".to_string(),
            event_type: "trade.profit".to_string(),
            context_key: "trade.profit.a".to_string(),
            timestamp: Utc::now(),
            data: HashMap::new(),
        }
    }

    #[test]
    fn event_round_trips_through_the_wire_format() {
        let e = event();
        let bytes = serde_json::to_vec(&e).unwrap();
        let parsed: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn malformed_payload_is_rejected_not_panicking() {
        let result: Result<Event, _> = serde_json::from_slice(b"not json");
        assert!(result.is_err());
    }

    #[test]
    fn disposition_is_copy_and_comparable() {
        assert_eq!(Disposition::Ack, Disposition::Ack);
        assert_ne!(Disposition::Ack, Disposition::NackRequeue);
    }
}

//! Core data model for the event trigger service.
//!
//! These types are the wire/storage format shared by every other
//! `trigger-*` crate: rules, events, context windows, and notification
//! tasks. Nothing here talks to Redis, a broker, or an LLM — this crate
//! is pure data plus the handful of pure functions (glob matching) the
//! data model depends on.

mod event;
mod glob;
mod notify;
mod rule;

pub use event::{Event, EventRef, EventValue};
pub use glob::glob_match_context_key;
pub use notify::{ExecutionRecord, NotificationStatus, NotificationTask, Target};
pub use rule::{LLMConfig, PreFilter, Rule, RuleConfig, TriggerMode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delivery target for a fired rule's notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Target {
    Telegram { chat_id: String },
    Wecom { webhook_key: String },
    Email { to: Vec<String> },
}

impl Target {
    /// Stable key used for dedup and rate-limit bucketing — distinct
    /// per (channel, destination), not just per channel kind. Email's
    /// recipient list is joined in declaration order so two targets
    /// with the same recipients (in the same order) collide and two
    /// with a different recipient set or ordering don't.
    pub fn dedup_key(&self) -> String {
        match self {
            Target::Telegram { chat_id } => format!("telegram:{chat_id}"),
            Target::Wecom { webhook_key } => format!("wecom:{webhook_key}"),
            Target::Email { to } => format!("email:{}", to.join(",")),
        }
    }
}

/// Outcome of attempting to deliver a notification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
    Skipped,
}

/// A single unit of delivery work: one rule firing against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub rule_id: String,
    pub context_key: String,
    pub target: Target,
    pub message: String,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest time this task should be attempted again. `None` means
    /// eligible immediately — set on re-push after a transient failure
    /// so the worker can defer rather than busy-loop on it.
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A durable record of a rule firing and what happened to its
/// notifications, kept for operator visibility (not a replayable
/// execution log — see non-goals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub rule_id: String,
    pub context_key: String,
    pub event_id: String,
    pub fired: bool,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub statuses: Vec<(Target, NotificationStatus)>,
    pub evaluated_at: DateTime<Utc>,
}

//! Notification Pipeline (spec.md §4.7): dedup/rate-limit enqueue gate,
//! a retrying delivery worker, and the [`NotificationChannel`]
//! transport boundary real Telegram/WeCom/SMTP clients plug into.

mod backoff;
mod channel;
mod error;
mod gate;
mod metrics;
mod worker;

pub use channel::{ChannelError, ChannelResult, LoggingChannel, NotificationChannel};
pub use error::{NotifyError, NotifyResult};
pub use gate::{EnqueueOutcome, NotificationGate};
pub use metrics::NotifyMetrics;
pub use worker::{NotificationWorker, NotifyWorkerConfig};

//! Rule Router + event handler (spec.md §4.6): turns one ingested
//! event into rule evaluations, LLM calls, and queued notifications,
//! plus the periodic tick that keeps batch/interval rules honest when
//! live traffic doesn't happen to flush them.

mod error;
mod handler;
mod metrics;
mod sink;
pub mod tick;

pub use error::{CoreError, CoreResult};
pub use handler::{EventHandler, HandleOutcome};
pub use metrics::TriggerMetrics;
pub use sink::{ExecutionSink, JsonlExecutionSink, NullExecutionSink};

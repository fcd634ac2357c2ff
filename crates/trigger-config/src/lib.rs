//! Process configuration and tracing setup.
//!
//! `trigger.toml` plus environment variable overrides resolve into a
//! single validated [`TriggerConfig`]. [`tracing_init::init_tracing`]
//! wires up the domain-prefixed log formatter every other crate's
//! `trg_*!` macros (see [`log_macros`]) feed into.

mod config;
mod logging;
pub mod tracing_init;
pub mod types;

#[macro_use]
pub mod log_macros;

pub use config::TriggerConfig;
pub use logging::{LogFormat, LoggingConfig};

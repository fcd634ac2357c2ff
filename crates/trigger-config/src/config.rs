use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::types::HumanDuration;

#[derive(Debug, Deserialize)]
struct TriggerConfigRaw {
    #[serde(default = "default_redis_url")]
    redis_url: String,
    #[serde(default = "default_rabbitmq_url")]
    rabbitmq_url: String,
    #[serde(default = "default_rabbitmq_queue")]
    rabbitmq_queue: String,
    #[serde(default)]
    openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    openai_base_url: String,
    #[serde(default = "default_openai_model")]
    openai_model: String,
    #[serde(default = "default_openai_timeout")]
    openai_timeout: HumanDuration,
    #[serde(default = "default_context_window_seconds")]
    context_window_seconds: u64,
    #[serde(default = "default_context_max_events")]
    context_max_events: u32,
    #[serde(default = "default_notification_max_retry")]
    notification_max_retry: u32,
    #[serde(default = "default_notification_default_cooldown")]
    notification_default_cooldown: HumanDuration,
    #[serde(default)]
    logging: LoggingConfig,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_rabbitmq_url() -> String {
    "amqp://127.0.0.1:5672/%2f".to_string()
}
fn default_rabbitmq_queue() -> String {
    "trigger_events".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_timeout() -> HumanDuration {
    Duration::from_secs(30).into()
}
fn default_context_window_seconds() -> u64 {
    300
}
fn default_context_max_events() -> u32 {
    100
}
fn default_notification_max_retry() -> u32 {
    3
}
fn default_notification_default_cooldown() -> HumanDuration {
    Duration::from_secs(60).into()
}

/// Resolved, validated process configuration.
///
/// Every field may come from `trigger.toml` or from its matching
/// environment variable; the environment always wins (see
/// [`TriggerConfig::from_str`]).
#[derive(Debug)]
pub struct TriggerConfig {
    pub redis_url: String,
    pub rabbitmq_url: String,
    pub rabbitmq_queue: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_timeout: HumanDuration,
    pub context_window_seconds: u64,
    pub context_max_events: u32,
    pub notification_max_retry: u32,
    pub notification_default_cooldown: HumanDuration,
    pub logging: LoggingConfig,
}

impl TriggerConfig {
    /// Read and parse `trigger.toml`, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }

    fn env_override(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.redis_url = v;
        }
        if let Ok(v) = std::env::var("RABBITMQ_URL") {
            self.rabbitmq_url = v;
        }
        if let Ok(v) = std::env::var("RABBITMQ_QUEUE") {
            self.rabbitmq_queue = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL") {
            self.openai_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_TIMEOUT") {
            self.openai_timeout = v
                .parse()
                .map_err(|e| anyhow::anyhow!("OPENAI_TIMEOUT: {e}"))?;
        }
        if let Ok(v) = std::env::var("CONTEXT_WINDOW_SECONDS") {
            self.context_window_seconds = v
                .parse()
                .map_err(|_| anyhow::anyhow!("CONTEXT_WINDOW_SECONDS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("CONTEXT_MAX_EVENTS") {
            self.context_max_events = v
                .parse()
                .map_err(|_| anyhow::anyhow!("CONTEXT_MAX_EVENTS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("NOTIFICATION_MAX_RETRY") {
            self.notification_max_retry = v
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFICATION_MAX_RETRY must be an integer"))?;
        }
        if let Ok(v) = std::env::var("NOTIFICATION_DEFAULT_COOLDOWN") {
            self.notification_default_cooldown = v
                .parse()
                .map_err(|e| anyhow::anyhow!("NOTIFICATION_DEFAULT_COOLDOWN: {e}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.context_max_events == 0 {
            anyhow::bail!("context_max_events must be > 0");
        }
        if self.context_window_seconds == 0 {
            anyhow::bail!("context_window_seconds must be > 0");
        }
        if self.notification_max_retry == 0 {
            anyhow::bail!("notification_max_retry must be > 0");
        }
        if self.rabbitmq_queue.is_empty() {
            anyhow::bail!("rabbitmq_queue must be non-empty");
        }
        Ok(())
    }
}

impl FromStr for TriggerConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: TriggerConfigRaw = toml::from_str(toml_str)?;
        let mut config = TriggerConfig {
            redis_url: raw.redis_url,
            rabbitmq_url: raw.rabbitmq_url,
            rabbitmq_queue: raw.rabbitmq_queue,
            openai_api_key: raw.openai_api_key,
            openai_base_url: raw.openai_base_url,
            openai_model: raw.openai_model,
            openai_timeout: raw.openai_timeout,
            context_window_seconds: raw.context_window_seconds,
            context_max_events: raw.context_max_events,
            notification_max_retry: raw.notification_max_retry,
            notification_default_cooldown: raw.notification_default_cooldown,
            logging: raw.logging,
        };
        config.env_override()?;
        config.validate()?;
        Ok(config)
    }
}

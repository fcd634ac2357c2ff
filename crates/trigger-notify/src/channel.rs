use async_trait::async_trait;
use trigger_config::trg_info;
use trigger_types::Target;

/// What went wrong sending to a channel, coarsened to whether retrying
/// could plausibly help (spec.md §4.7).
#[derive(Debug, Clone)]
pub enum ChannelError {
    Transient(String),
    Permanent(String),
}

pub type ChannelResult = Result<(), ChannelError>;

/// A delivery transport. Real Telegram/WeCom/SMTP clients live outside
/// this crate (spec.md §1 names them as external integrations); this
/// crate ships only [`LoggingChannel`] for bootstrap wiring.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, target: &Target, message: &str) -> ChannelResult;
}

/// Writes every send to `tracing` and always succeeds — stands in for
/// a real transport until one is wired, and useful for demo/dry-run
/// deployments.
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    async fn send(&self, target: &Target, message: &str) -> ChannelResult {
        trg_info!(notify, target = ?target, message, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_channels {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Always fails transiently — drives retry/backoff tests.
    pub struct AlwaysTransientChannel {
        pub attempts: AtomicUsize,
    }

    impl AlwaysTransientChannel {
        pub fn new() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NotificationChannel for AlwaysTransientChannel {
        async fn send(&self, _target: &Target, _message: &str) -> ChannelResult {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ChannelError::Transient("connection refused".to_string()))
        }
    }

    /// Always fails permanently — must bypass retry straight to the
    /// dead letter list.
    pub struct AlwaysPermanentChannel;

    #[async_trait]
    impl NotificationChannel for AlwaysPermanentChannel {
        async fn send(&self, _target: &Target, _message: &str) -> ChannelResult {
            Err(ChannelError::Permanent("invalid chat id".to_string()))
        }
    }

    /// Returns a scripted sequence of results, one per call, repeating
    /// the last entry once exhausted. Records every (target, message)
    /// it was called with for assertions.
    pub struct ScriptedChannel {
        script: Mutex<Vec<ChannelResult>>,
        pub calls: Mutex<Vec<(Target, String)>>,
    }

    impl ScriptedChannel {
        pub fn new(script: Vec<ChannelResult>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationChannel for ScriptedChannel {
        async fn send(&self, target: &Target, message: &str) -> ChannelResult {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), message.to_string()));
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(());
            }
            if script.len() == 1 {
                script[0].clone()
            } else {
                script.remove(0)
            }
        }
    }
}

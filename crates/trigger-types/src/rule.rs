use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::Target;

/// Expression pre-filter guarding an LLM call, or standing alone as a
/// rule's entire condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreFilter {
    pub expression: String,
}

/// Scheduling policy for an LLM rule.
///
/// The mode-specific fields (`batch_size`/`max_wait_seconds` for batch,
/// `interval_seconds` for interval) are folded into the variant instead
/// of living as `Option` fields on a flat struct, so "batch_size
/// required iff mode=batch" is a property of the type rather than a
/// runtime check (see DESIGN.md, Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger_mode", rename_all = "snake_case")]
pub enum TriggerMode {
    Realtime,
    Batch {
        batch_size: u32,
        max_wait_seconds: u64,
    },
    Interval {
        interval_seconds: u64,
    },
}

/// Natural-language rule description plus its trigger mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    pub description: String,
    #[serde(flatten)]
    pub trigger_mode: TriggerMode,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl LLMConfig {
    /// Confidence threshold clamped to `[0, 1]`.
    pub fn clamped_threshold(&self) -> f64 {
        self.confidence_threshold.clamp(0.0, 1.0)
    }
}

/// Architectural shape of a rule, carrying exactly the sub-config its
/// kind requires — a closed union instead of a flat struct with
/// optional fields whose presence depends on a `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    Expression { pre_filter: PreFilter },
    Llm { llm_config: LLMConfig },
    Hybrid {
        pre_filter: PreFilter,
        llm_config: LLMConfig,
    },
}

impl RuleConfig {
    pub fn pre_filter(&self) -> Option<&PreFilter> {
        match self {
            RuleConfig::Expression { pre_filter } | RuleConfig::Hybrid { pre_filter, .. } => {
                Some(pre_filter)
            }
            RuleConfig::Llm { .. } => None,
        }
    }

    pub fn llm_config(&self) -> Option<&LLMConfig> {
        match self {
            RuleConfig::Llm { llm_config } | RuleConfig::Hybrid { llm_config, .. } => {
                Some(llm_config)
            }
            RuleConfig::Expression { .. } => None,
        }
    }
}

/// Rate limiting and delivery targets for a rule's notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPolicy {
    pub targets: Vec<Target>,
    pub rate_limit: RateLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_per_minute: u32,
    pub cooldown_seconds: u64,
}

/// A user-defined trigger rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub priority: i64,
    pub event_types: HashSet<String>,
    #[serde(default)]
    pub context_keys: Vec<String>,
    pub rule_config: RuleConfig,
    pub notify_policy: NotifyPolicy,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }

    pub fn matches_context_key(&self, context_key: &str) -> bool {
        crate::glob_match_context_key(&self.context_keys, context_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_mode_round_trips_through_json() {
        let modes = [
            TriggerMode::Realtime,
            TriggerMode::Batch {
                batch_size: 5,
                max_wait_seconds: 30,
            },
            TriggerMode::Interval {
                interval_seconds: 60,
            },
        ];
        for mode in modes {
            let json = serde_json::to_string(&mode).unwrap();
            let back: TriggerMode = serde_json::from_str(&json).unwrap();
            assert_eq!(mode, back);
        }
    }

    #[test]
    fn rule_config_kind_carries_only_its_own_sub_config() {
        let expr = RuleConfig::Expression {
            pre_filter: PreFilter {
                expression: "x > 0".into(),
            },
        };
        assert!(expr.pre_filter().is_some());
        assert!(expr.llm_config().is_none());

        let llm = RuleConfig::Llm {
            llm_config: LLMConfig {
                description: "desc".into(),
                trigger_mode: TriggerMode::Realtime,
                confidence_threshold: 0.7,
            },
        };
        assert!(llm.pre_filter().is_none());
        assert!(llm.llm_config().is_some());
    }

    #[test]
    fn confidence_threshold_clamps() {
        let cfg = LLMConfig {
            description: String::new(),
            trigger_mode: TriggerMode::Realtime,
            confidence_threshold: 1.5,
        };
        assert_eq!(cfg.clamped_threshold(), 1.0);

        let cfg = LLMConfig {
            confidence_threshold: -0.2,
            ..cfg
        };
        assert_eq!(cfg.clamped_threshold(), 0.0);
    }
}

//! Configuration types
//!
//! Typed configuration with an enumerated option set. Unknown keys are
//! rejected at deserialization time; `validate()` enforces value-level
//! constraints before the engine starts.

use crate::{AgentResult, ConfigError, Language, short_hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SUB-CONFIGS
// ============================================================================

/// Memory window sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MemoryConfig {
    /// Recent turns kept verbatim in the window
    pub max_short_term_turns: usize,
    /// Most recent turns considered when building the window
    pub max_long_term_turns: usize,
    /// Token budget for the assembled window
    pub max_tokens: i32,
    /// Compression kicks in at this fraction of the budget
    pub compression_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_short_term_turns: 10,
            max_long_term_turns: 50,
            max_tokens: 4000,
            compression_threshold: 0.8,
        }
    }
}

impl MemoryConfig {
    /// Short fingerprint of the sizing parameters. Included in memory cache
    /// keys so a config change never revives windows shaped by old limits.
    pub fn fingerprint(&self) -> String {
        short_hash(&[
            &self.max_short_term_turns.to_string(),
            &self.max_long_term_turns.to_string(),
            &self.max_tokens.to_string(),
        ])
    }
}

/// Per-namespace cache TTLs, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheTtlConfig {
    pub memory_secs: u64,
    pub intent_secs: u64,
    pub places_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            memory_secs: 300,
            intent_secs: 3600,
            places_secs: 1800,
        }
    }
}

/// Request, model-call and tool-call deadlines, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeadlineConfig {
    pub per_request_ms: u64,
    pub model_call_ms: u64,
    pub tool_call_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            per_request_ms: 30_000,
            model_call_ms: 15_000,
            tool_call_ms: 10_000,
        }
    }
}

/// Per-process concurrency limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConcurrencyConfig {
    /// Active model calls across all requests
    pub max_model_calls: usize,
    /// Active tool calls across all requests
    pub max_tool_calls: usize,
    /// Waiters allowed beyond the active limit before fast-failing
    pub max_queued: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_model_calls: 32,
            max_tool_calls: 64,
            max_queued: 128,
        }
    }
}

/// Places service collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacesConfig {
    pub base_url: String,
    #[serde(default = "default_places_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_places_timeout_ms() -> u64 {
    10_000
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_ms: default_places_timeout_ms(),
        }
    }
}

// ============================================================================
// MODEL CATALOG
// ============================================================================

/// Cost/latency profile for one model. The router selects by tier label and
/// never hard-codes these names in logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelProfile {
    pub name: String,
    pub provider: String,
    /// USD per 1000 input tokens
    pub input_cost_per_1k: f64,
    /// USD per 1000 output tokens
    pub output_cost_per_1k: f64,
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: i32,
    #[serde(default = "default_model_temperature")]
    pub temperature: f32,
}

fn default_model_max_tokens() -> i32 {
    2048
}

fn default_model_temperature() -> f32 {
    0.7
}

/// Named model tiers plus the profiles behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelCatalog {
    /// Small fast model for tool-driven work
    pub fast: String,
    /// Mid-tier reasoning model
    pub mid: String,
    /// Top-tier reasoning model
    pub top: String,
    /// Small cheap conversational model
    pub chat: String,
    pub profiles: HashMap<String, ModelProfile>,
}

impl ModelCatalog {
    /// Look up a profile by model name.
    pub fn profile(&self, name: &str) -> AgentResult<&ModelProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::MissingModel { label: name.to_string() }.into())
    }

    /// Default OpenAI-shaped catalog. Deployments override this wholesale.
    pub fn openai_default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "gpt-4o-mini".to_string(),
            ModelProfile {
                name: "gpt-4o-mini".to_string(),
                provider: "openai".to_string(),
                input_cost_per_1k: 0.00015,
                output_cost_per_1k: 0.0006,
                max_tokens: 2048,
                temperature: 0.7,
            },
        );
        profiles.insert(
            "gpt-3.5-turbo".to_string(),
            ModelProfile {
                name: "gpt-3.5-turbo".to_string(),
                provider: "openai".to_string(),
                input_cost_per_1k: 0.0005,
                output_cost_per_1k: 0.0015,
                max_tokens: 1024,
                temperature: 0.8,
            },
        );
        profiles.insert(
            "gpt-4-turbo".to_string(),
            ModelProfile {
                name: "gpt-4-turbo".to_string(),
                provider: "openai".to_string(),
                input_cost_per_1k: 0.01,
                output_cost_per_1k: 0.03,
                max_tokens: 4096,
                temperature: 0.7,
            },
        );
        profiles.insert(
            "gpt-4".to_string(),
            ModelProfile {
                name: "gpt-4".to_string(),
                provider: "openai".to_string(),
                input_cost_per_1k: 0.03,
                output_cost_per_1k: 0.06,
                max_tokens: 4096,
                temperature: 0.7,
            },
        );
        Self {
            fast: "gpt-4o-mini".to_string(),
            mid: "gpt-4-turbo".to_string(),
            top: "gpt-4".to_string(),
            chat: "gpt-3.5-turbo".to_string(),
            profiles,
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::openai_default()
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Master configuration for the request orchestration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    pub supported_languages: Vec<Language>,
    pub default_language: Language,
    /// Forces the router to the cheapest model when set
    pub budget_mode: bool,
    /// Overrides the router when set and compatible with the intent
    pub preferred_model: Option<String>,
    /// Base system prompt; the context builder augments it per request
    pub system_prompt: Option<String>,
    pub memory: MemoryConfig,
    pub cache_ttl: CacheTtlConfig,
    pub deadlines: DeadlineConfig,
    pub max_reasoning_iterations: usize,
    pub limits: ConcurrencyConfig,
    pub places: PlacesConfig,
    pub models: ModelCatalog,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_languages: vec![Language::Es, Language::En, Language::Ca, Language::Gl],
            default_language: Language::Es,
            budget_mode: false,
            preferred_model: None,
            system_prompt: None,
            memory: MemoryConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            deadlines: DeadlineConfig::default(),
            max_reasoning_iterations: 6,
            limits: ConcurrencyConfig::default(),
            places: PlacesConfig::default(),
            models: ModelCatalog::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(AgentError::Config) if invalid.
    pub fn validate(&self) -> AgentResult<()> {
        if self.supported_languages.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "supported_languages".to_string(),
                value: "[]".to_string(),
                reason: "at least one language must be supported".to_string(),
            }
            .into());
        }

        if !self.supported_languages.contains(&self.default_language) {
            return Err(ConfigError::InvalidValue {
                field: "default_language".to_string(),
                value: self.default_language.code().to_string(),
                reason: "default_language must be in supported_languages".to_string(),
            }
            .into());
        }

        if self.memory.max_tokens <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory.max_tokens".to_string(),
                value: self.memory.max_tokens.to_string(),
                reason: "max_tokens must be greater than 0".to_string(),
            }
            .into());
        }

        if self.memory.max_short_term_turns == 0
            || self.memory.max_short_term_turns > self.memory.max_long_term_turns
        {
            return Err(ConfigError::InvalidValue {
                field: "memory.max_short_term_turns".to_string(),
                value: self.memory.max_short_term_turns.to_string(),
                reason: "must be in 1..=max_long_term_turns".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.memory.compression_threshold)
            || self.memory.compression_threshold == 0.0
        {
            return Err(ConfigError::InvalidValue {
                field: "memory.compression_threshold".to_string(),
                value: self.memory.compression_threshold.to_string(),
                reason: "must be in (0.0, 1.0]".to_string(),
            }
            .into());
        }

        if self.max_reasoning_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_reasoning_iterations".to_string(),
                value: "0".to_string(),
                reason: "the reason-act loop needs at least one iteration".to_string(),
            }
            .into());
        }

        for (field, value) in [
            ("deadlines.per_request_ms", self.deadlines.per_request_ms),
            ("deadlines.model_call_ms", self.deadlines.model_call_ms),
            ("deadlines.tool_call_ms", self.deadlines.tool_call_ms),
            ("places.timeout_ms", self.places.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "timeouts must be positive".to_string(),
                }
                .into());
            }
        }

        if self.limits.max_model_calls == 0 || self.limits.max_tool_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits".to_string(),
                value: format!(
                    "max_model_calls={}, max_tool_calls={}",
                    self.limits.max_model_calls, self.limits.max_tool_calls
                ),
                reason: "concurrency limits must be positive".to_string(),
            }
            .into());
        }

        // Every tier label must resolve to a profile
        for (field, label) in [
            ("models.fast", &self.models.fast),
            ("models.mid", &self.models.mid),
            ("models.top", &self.models.top),
            ("models.chat", &self.models.chat),
        ] {
            if !self.models.profiles.contains_key(label) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: label.clone(),
                    reason: "tier label has no profile in models.profiles".to_string(),
                }
                .into());
            }
        }

        if let Some(preferred) = &self.preferred_model {
            if !self.models.profiles.contains_key(preferred) {
                return Err(ConfigError::InvalidValue {
                    field: "preferred_model".to_string(),
                    value: preferred.clone(),
                    reason: "preferred_model has no profile in models.profiles".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

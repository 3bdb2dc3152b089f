//! Configuration model.
//!
//! Everything here is plain data deserialized from YAML or TOML. Cross
//! references (models → providers, tiers → models, agents → tiers) are only
//! checked when a [`ConfigSnapshot`](crate::ConfigSnapshot) is built.

use gateway_core::{KeyKind, ModelCapabilities};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Root configuration document
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Reasoning-loop settings
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineSettings,

    /// Key pool settings
    #[serde(default)]
    pub keys: KeyPoolSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Upstream providers by id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Model catalog by name
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    /// Tiers by name; members are model or tier names
    #[serde(default)]
    pub tiers: BTreeMap<String, Vec<String>>,

    /// Agent definitions
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,

    /// Reasoning pattern templates by name
    #[serde(default)]
    pub patterns: BTreeMap<String, PatternTemplate>,

    /// Agent mutation settings
    #[serde(default)]
    pub mutations: MutationSettings,
}

/// Reasoning-loop settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSettings {
    /// Maximum think-act steps before a final answer is forced
    #[serde(default = "default_max_steps")]
    #[validate(range(min = 1, max = 100))]
    pub max_steps: usize,

    /// Maximum upstream attempts per step across the chain
    #[serde(default = "default_max_chain_attempts")]
    #[validate(range(min = 1, max = 64))]
    pub max_chain_attempts: usize,

    /// Bounded wait for one upstream call
    #[serde(default = "default_upstream_timeout", with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Bounded wait for one tool invocation
    #[serde(default = "default_tool_timeout", with = "humantime_serde")]
    pub tool_timeout: Duration,

    /// Deadline for a whole session
    #[serde(default, with = "humantime_serde")]
    pub session_timeout: Option<Duration>,

    /// Delay between fail-over attempts
    #[serde(default)]
    pub backoff: BackoffSettings,

    /// Progress messages shown while a tool runs
    #[serde(default = "default_progress")]
    pub progress: Vec<ProgressStep>,

    /// Capacity of the per-session event channel
    #[serde(default = "default_event_buffer")]
    #[validate(range(min = 1))]
    pub event_buffer: usize,

    /// Tool that receives query lists recovered from malformed planning output
    #[serde(default = "default_query_tool")]
    pub query_tool: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_chain_attempts: default_max_chain_attempts(),
            upstream_timeout: default_upstream_timeout(),
            tool_timeout: default_tool_timeout(),
            session_timeout: None,
            backoff: BackoffSettings::default(),
            progress: default_progress(),
            event_buffer: default_event_buffer(),
            query_tool: default_query_tool(),
        }
    }
}

/// Backoff between fail-over attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Delay before the first fail-over
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for the delay
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize delays
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_backoff(),
            max_delay: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

/// One scheduled progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    /// Delay after the previous step (or tool start)
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Text shown to the user
    pub message: String,
}

impl ProgressStep {
    /// Create a progress step
    pub fn new(delay: Duration, message: impl Into<String>) -> Self {
        Self {
            delay,
            message: message.into(),
        }
    }
}

/// Key pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolSettings {
    /// Quarantine rate-limited keys (otherwise they are requeued)
    #[serde(default = "default_true")]
    pub quarantine_enabled: bool,

    /// How long a rate-limited key stays out of rotation
    #[serde(default = "default_quarantine_duration", with = "humantime_serde")]
    pub quarantine_duration: Duration,

    /// Period of the background quarantine sweeper
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for KeyPoolSettings {
    fn default() -> Self {
        Self {
            quarantine_enabled: true,
            quarantine_duration: default_quarantine_duration(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level filter (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Upstream provider definition
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base endpoint, e.g. `https://api.groq.com/openai/v1`
    pub base_url: String,

    /// Whether calls need a pooled credential; defaults to `false` for `local*` ids
    #[serde(default)]
    pub requires_key: Option<bool>,

    /// Provider-wide capabilities
    #[serde(default)]
    pub capabilities: ModelCapabilities,

    /// Inline credentials
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,

    /// Credential files, one key per line
    #[serde(default)]
    pub credential_files: Vec<CredentialFile>,
}

/// Inline credential
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    /// The secret key
    pub secret: SecretString,
    /// Billing class
    #[serde(default)]
    pub kind: KeyKind,
}

/// Credential file reference
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialFile {
    /// File path
    pub path: PathBuf,
    /// Billing class of every key in the file
    #[serde(default)]
    pub kind: KeyKind,
}

/// Model catalog entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider id
    pub provider: String,
    /// Upstream model id
    pub model_id: String,
    /// Capability overrides on top of the provider's
    #[serde(default)]
    pub capabilities: CapabilityOverrides,
}

/// Optional per-model capability overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOverrides {
    /// Override parallel tool call support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Override JSON-mode support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_mode: Option<bool>,
    /// Default temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CapabilityOverrides {
    /// Overlay these overrides on a base capability set
    #[must_use]
    pub fn apply(&self, base: ModelCapabilities) -> ModelCapabilities {
        ModelCapabilities {
            parallel_tool_calls: self.parallel_tool_calls.unwrap_or(base.parallel_tool_calls),
            json_mode: self.json_mode.unwrap_or(base.json_mode),
            temperature: self.temperature.or(base.temperature),
        }
    }
}

/// Agent definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent name
    pub name: String,
    /// Alternative names
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Behavior defaults
    #[serde(default)]
    pub settings: AgentSettings,
    /// Failover routing
    pub router: RouterSettings,
}

/// Agent behavior defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Reasoning pattern name
    #[serde(default = "default_reasoning_mode")]
    pub reasoning_mode: String,
    /// Tool policy
    #[serde(default)]
    pub tools: ToolPolicy,
    /// Request JSON mode by default
    #[serde(default)]
    pub json_mode: bool,
    /// Agent-level system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            reasoning_mode: default_reasoning_mode(),
            tools: ToolPolicy::default(),
            json_mode: false,
            system_instruction: None,
        }
    }
}

/// Which tools an agent may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Offer tools at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Restrict to these tool names (empty means all)
    #[serde(default)]
    pub allow: Vec<String>,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            allow: Vec::new(),
        }
    }
}

impl ToolPolicy {
    /// Check whether a tool is permitted
    #[must_use]
    pub fn permits(&self, tool: &str) -> bool {
        self.enabled && (self.allow.is_empty() || self.allow.iter().any(|t| t == tool))
    }
}

/// Main and fallback chain references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Primary references, rotated per request
    #[serde(default)]
    pub main: Vec<String>,
    /// Fallback references, fixed order
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

/// Reasoning pattern template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTemplate {
    /// System template
    pub static_system: String,
    /// Context template appended to the system prompt
    #[serde(default)]
    pub dynamic_context: String,
    /// User turn sent after the scratchpad
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_prompt: Option<String>,
}

/// Config-time agent mutation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationSettings {
    /// Generate reasoning-mode variants for every agent
    #[serde(default)]
    pub enabled: bool,
    /// Agents that never get variants
    #[serde(default)]
    pub exclusions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_steps() -> usize {
    10
}

fn default_max_chain_attempts() -> usize {
    3
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_event_buffer() -> usize {
    64
}

fn default_query_tool() -> String {
    "search".to_string()
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_quarantine_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reasoning_mode() -> String {
    "simple".to_string()
}

fn default_progress() -> Vec<ProgressStep> {
    vec![
        ProgressStep::new(
            Duration::ZERO,
            "This may take a while, please wait...",
        ),
        ProgressStep::new(
            Duration::from_secs(10),
            "Still working on it, nothing is stuck.",
        ),
        ProgressStep::new(
            Duration::from_secs(10),
            "This is taking longer than usual, still working on your request...",
        ),
    ]
}

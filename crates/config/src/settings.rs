//! Typed configuration surface, spec.md §6 "Configuration surface"
//!
//! Loaded via the `config` crate layered as file -> environment, matching
//! the teacher's `voice-agent-config::settings::load_settings` pattern
//! (defaulted fields via `#[serde(default = "...")]`, a typed record per
//! concern rather than an ad-hoc map).

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub paths: PathsSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            llm: LlmSettings::default(),
            scheduler: SchedulerSettings::default(),
            memory: MemorySettings::default(),
            paths: PathsSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Layer a config file (if present) with `SHELLWRIGHT_`-prefixed
    /// environment variable overrides, matching the teacher's
    /// `config::Config` builder usage.
    pub fn load(file_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SHELLWRIGHT")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let settings: Settings = built.try_deserialize()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8025
}
fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider_order")]
    pub ordered_providers: Vec<String>,
    #[serde(default = "default_provider_configs")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_provider_max_timeout_ms")]
    pub provider_max_timeout_ms: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_max_fallbacks")]
    pub max_fallbacks: u32,
    #[serde(default = "default_template_threshold")]
    pub template_match_threshold: f32,
}

/// One entry of the `ordered_providers` list, naming where to reach it and
/// which env var holds its API key. Credentials never live in the config
/// file itself (spec.md §4.E provider bindings).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    pub kind: String,
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub response_pointer: Option<String>,
}

fn default_provider_configs() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "ollama".to_string(),
        kind: "ollama".to_string(),
        base_url: "http://127.0.0.1:11434".to_string(),
        model: "llama3".to_string(),
        api_key_env: None,
        response_pointer: None,
    }]
}

fn default_provider_order() -> Vec<String> {
    vec!["ollama".to_string()]
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_provider_max_timeout_ms() -> u64 {
    60_000
}
fn default_health_interval_secs() -> u64 {
    30
}
fn default_health_timeout_ms() -> u64 {
    2_000
}
fn default_max_fallbacks() -> u32 {
    3
}
fn default_template_threshold() -> f32 {
    0.15
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ordered_providers: default_provider_order(),
            providers: default_provider_configs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            provider_max_timeout_ms: default_provider_max_timeout_ms(),
            health_interval_secs: default_health_interval_secs(),
            health_timeout_ms: default_health_timeout_ms(),
            max_fallbacks: default_max_fallbacks(),
            template_match_threshold: default_template_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    #[serde(default = "default_sample_interval_ms")]
    pub resource_sample_interval_ms: u64,
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default = "default_aging_threshold_secs")]
    pub aging_threshold_seconds: u64,
    #[serde(default)]
    pub require_confirm_token_for_elevated: bool,
    /// Shared secret the caller must echo back as `confirmToken` on
    /// `POST /api/execute/script` when `policy = elevated` and
    /// `requireConfirmTokenForElevated` is set (spec.md §9 open
    /// question on elevated confirmation).
    #[serde(default)]
    pub confirm_token: Option<String>,
}

fn default_max_concurrent() -> usize {
    4
}
fn default_history_max() -> usize {
    500
}
fn default_max_timeout_seconds() -> u64 {
    300
}
fn default_sample_interval_ms() -> u64 {
    500
}
fn default_grace_period_ms() -> u64 {
    3_000
}
fn default_aging_threshold_secs() -> u64 {
    30
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            history_max: default_history_max(),
            max_timeout_seconds: default_max_timeout_seconds(),
            resource_sample_interval_ms: default_sample_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            aging_threshold_seconds: default_aging_threshold_secs(),
            require_confirm_token_for_elevated: false,
            confirm_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    #[serde(default = "default_max_messages")]
    pub max_messages_per_conversation: usize,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_context_chars")]
    pub context_max_chars: usize,
}

fn default_max_conversations() -> usize {
    1_000
}
fn default_max_messages() -> usize {
    200
}
fn default_context_window() -> usize {
    20
}
fn default_context_chars() -> usize {
    8_000
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            max_messages_per_conversation: default_max_messages(),
            context_window: default_context_window(),
            context_max_chars: default_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSettings {
    #[serde(default = "default_personas_path")]
    pub personas: String,
    #[serde(default = "default_channels_path")]
    pub channels: String,
    #[serde(default = "default_scripts_path")]
    pub scripts: String,
    #[serde(default = "default_logs_path")]
    pub logs: String,
}

fn default_personas_path() -> String {
    "./data/personas".to_string()
}
fn default_channels_path() -> String {
    "./data/channels".to_string()
}
fn default_scripts_path() -> String {
    "./data/scripts".to_string()
}
fn default_logs_path() -> String {
    "./data/logs".to_string()
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            personas: default_personas_path(),
            channels: default_channels_path(),
            scripts: default_scripts_path(),
            logs: default_logs_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_sink")]
    pub sink: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_sink() -> String {
    "stdout".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            sink: default_log_sink(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.server.port, 8025);
        assert_eq!(settings.scheduler.max_concurrent, 4);
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("SHELLWRIGHT__SERVER__PORT", "9000");
        let settings = Settings::load(None).unwrap();
        std::env::remove_var("SHELLWRIGHT__SERVER__PORT");
        assert_eq!(settings.server.port, 9000);
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Playbook engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "config/playbook-engine.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering the given file over the embedded defaults
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: PLAYBOOK_ENGINE_)
            .add_source(
                config::Environment::with_prefix("PLAYBOOK_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of executions retained in history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Pause between consecutive steps of one execution (milliseconds)
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Seed the built-in playbooks at startup
    #[serde(default = "default_true")]
    pub seed_default_playbooks: bool,

    /// Directory of YAML/JSON playbook definitions loaded at startup
    #[serde(default)]
    pub playbooks_dir: Option<PathBuf>,

    /// What to do when a step names an action nobody registered
    #[serde(default)]
    pub unknown_action_policy: UnknownActionPolicy,
}

impl EngineConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            step_delay_ms: default_step_delay_ms(),
            seed_default_playbooks: true,
            playbooks_dir: None,
            unknown_action_policy: UnknownActionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    /// Unresolved actions fail the step
    #[default]
    Fail,
    /// Unresolved actions succeed with an `unknown_action` marker result
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_history_capacity() -> usize {
    1000
}

fn default_step_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-playbook-engine".to_string()
}

fn default_true() -> bool {
    true
}

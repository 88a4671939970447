//! Configuration management for deep_research
//!
//! Supports loading configuration from TOML files with CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::BatchOptions;

/// Telemetry / OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Enable OpenTelemetry trace export (default: false)
    /// Can be overridden by env var DR_TRACING_ENABLED or OTEL_SDK_DISABLED
    #[serde(default)]
    pub enabled: bool,

    /// OTLP exporter endpoint (default: http://localhost:4317)
    /// Can be overridden by env var OTEL_EXPORTER_OTLP_ENDPOINT
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Service name reported to the collector (default: deep_research)
    /// Can be overridden by env var OTEL_SERVICE_NAME
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "deep_research".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
        }
    }
}

impl TelemetryConfig {
    /// Apply environment variable overrides.
    /// Env vars take precedence over TOML config values.
    pub fn with_env_overrides(mut self) -> Self {
        // OTEL_SDK_DISABLED=true → disabled (official OTel convention)
        if let Ok(val) = std::env::var("OTEL_SDK_DISABLED") {
            if val.eq_ignore_ascii_case("true") {
                self.enabled = false;
            }
        }
        // DR_TRACING_ENABLED=false → disabled (project-specific kill-switch)
        if let Ok(val) = std::env::var("DR_TRACING_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(val) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !val.is_empty() {
                self.otlp_endpoint = val;
            }
        }
        if let Ok(val) = std::env::var("OTEL_SERVICE_NAME") {
            if !val.is_empty() {
                self.service_name = val;
            }
        }
        self
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Web search and page retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results to retrieve per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Number of results for a drill-down pass
    #[serde(default = "default_drill_down_max_results")]
    pub drill_down_max_results: usize,

    /// Per-page fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Character budget for extracted page text fed to the summarizer
    #[serde(default = "default_page_text_budget")]
    pub page_text_budget: usize,

    /// User-Agent header sent with search and page requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Chat-completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key. When unset, read from the env var named by `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Completion-token cap for per-page summaries
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Completion-token cap for the aggregated answer
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl LlmConfig {
    /// Resolve the API key: explicit config value first, env var second.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

/// Batch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Summarization tasks dispatched together
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Round bound for the batch loop (unset = run until work is exhausted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,

    /// Ceiling on total tasks dispatched in one run (unset = no cap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<usize>,
}

impl EngineConfig {
    /// Translate into runner options.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            max_rounds: self.max_rounds,
            max_tasks: self.max_tasks,
        }
    }
}

fn default_max_results() -> usize {
    25
}

fn default_drill_down_max_results() -> usize {
    50
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_page_text_budget() -> usize {
    4000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; deep-research/0.4)".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.llama.com/v1".to_string()
}

fn default_llm_model() -> String {
    "Llama-3.3-70B-Instruct".to_string()
}

fn default_api_key_env() -> String {
    "LLAMA_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_summary_max_tokens() -> u32 {
    300
}

fn default_answer_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_batch_size() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            drill_down_max_results: default_drill_down_max_results(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            page_text_budget: default_page_text_budget(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_llm_timeout_secs(),
            summary_max_tokens: default_summary_max_tokens(),
            answer_max_tokens: default_answer_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_rounds: None,
            max_tasks: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. DEEP_RESEARCH_CONFIG environment variable
    /// 2. ./deep_research.toml (current directory)
    /// 3. ~/.config/deep_research/config.toml (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        // Check environment variable first
        if let Ok(env_path) = std::env::var("DEEP_RESEARCH_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        // Check current directory
        let local_path = PathBuf::from("deep_research.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("deep_research").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# Deep Research Configuration
# Generated template - customize as needed

[search]
# Number of web results to retrieve per query
max_results = 25

# Number of results for a drill-down pass
drill_down_max_results = 50

# Per-page fetch timeout in seconds
fetch_timeout_secs = 10

# Character budget for extracted page text fed to the summarizer
page_text_budget = 4000

[llm]
# Base URL of the OpenAI-compatible chat-completion API
base_url = "https://api.llama.com/v1"

# Model identifier sent with every request
model = "Llama-3.3-70B-Instruct"

# API key env var (set api_key here to override)
api_key_env = "LLAMA_API_KEY"

# Completion-token caps
summary_max_tokens = 300
answer_max_tokens = 1000

# Sampling temperature
temperature = 0.7

[engine]
# Summarization tasks dispatched together
batch_size = 10

# Round bound for the batch loop (omit to run until work is exhausted)
# max_rounds = 5

# Ceiling on total tasks dispatched in one run (omit for no cap)
# max_tasks = 200

[telemetry]
# Enable OpenTelemetry trace export (default: false)
# Set to true to enable OTLP export (console logging is always active)
# Env overrides: OTEL_SDK_DISABLED=true, DR_TRACING_ENABLED=true
enabled = false

# OTLP gRPC exporter endpoint (default: http://localhost:4317)
# Env override: OTEL_EXPORTER_OTLP_ENDPOINT
otlp_endpoint = "http://localhost:4317"

# Service name reported to the collector
# Env override: OTEL_SERVICE_NAME
service_name = "deep_research"
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge CLI overrides into the configuration
    pub fn with_overrides(
        mut self,
        max_results: Option<usize>,
        batch_size: Option<usize>,
        model: Option<String>,
    ) -> Self {
        if let Some(n) = max_results {
            self.search.max_results = n;
        }
        if let Some(n) = batch_size {
            self.engine.batch_size = n;
        }
        if let Some(model) = model {
            self.llm.model = model;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.max_results, 25);
        assert_eq!(config.engine.batch_size, 10);
        assert_eq!(config.llm.model, "Llama-3.3-70B-Instruct");
        assert!(config.engine.max_rounds.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[search]
max_results = 5

[engine]
batch_size = 3
max_rounds = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.engine.batch_size, 3);
        assert_eq!(config.engine.max_rounds, Some(2));
        // Untouched sections keep their defaults.
        assert_eq!(config.llm.summary_max_tokens, 300);
    }

    #[test]
    fn test_generate_template() {
        let template = Config::generate_template();
        assert!(template.contains("[search]"));
        assert!(template.contains("[llm]"));
        assert!(template.contains("[engine]"));
        assert!(template.contains("batch_size"));
        // The template parses back into a valid config.
        let parsed: Config = toml::from_str(&template).unwrap();
        assert_eq!(parsed.engine.batch_size, 10);
    }

    #[test]
    fn test_write_template_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::write_template(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.search.max_results, 25);
        assert_eq!(config.llm.base_url, "https://api.llama.com/v1");
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::default().with_overrides(Some(40), Some(8), None);
        assert_eq!(config.search.max_results, 40);
        assert_eq!(config.engine.batch_size, 8);
        assert_eq!(config.llm.model, "Llama-3.3-70B-Instruct");
    }

    #[test]
    fn test_batch_options_translation() {
        let engine = EngineConfig {
            batch_size: 4,
            max_rounds: Some(3),
            max_tasks: Some(12),
        };
        let options = engine.batch_options();
        assert_eq!(options.batch_size, 4);
        assert_eq!(options.max_rounds, Some(3));
        assert_eq!(options.max_tasks, Some(12));
    }
}

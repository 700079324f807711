//! Configuration management for the mission planner.
//!
//! Settings come from a YAML file (default `./config/localhost.yaml`):
//!
//! ```yaml
//! logging: INFO
//! max_retries: 5
//! max_tokens: 2000
//! temperature: 0.2
//! log_directory: ./missions
//! schema:
//!   - ./schemas/wheeled_bot.xsd
//! context_files:
//!   - ./context/orchard.geojson
//! ltl: true
//! promela_template: ./templates/wheeled_bot.pml
//! spin_path: /usr/local/bin/spin
//! ```
//!
//! Secrets and model choices can be overridden from the environment:
//! - `LLM_API_KEY` (or `OPENROUTER_API_KEY`) - API key for the chat-completions endpoint.
//! - `LLM_BASE_URL` - Endpoint base URL. Defaults to OpenRouter.
//! - `MISSION_MODEL`, `PROPERTY_MODEL`, `ARBITER_MODEL` - Model per role.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::llm::DEFAULT_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Improper YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Model identifiers for each generator role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Writes mission XML
    pub mission: String,
    /// Writes temporal properties
    pub property: String,
    /// Judges sampled runs when human review is off
    pub arbiter: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mission: "openai/gpt-4o".to_string(),
            property: "openai/gpt-4o".to_string(),
            arbiter: "anthropic/claude-3.5-sonnet".to_string(),
        }
    }
}

/// Model-checker invocation settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Per-invocation limit; unlimited when unset
    pub timeout_secs: Option<u64>,
    /// Directory the search runs in; the session work dir when unset
    pub search_dir: Option<PathBuf>,
}

/// Planner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level name (`DEBUG`, `INFO`, ...)
    pub logging: String,

    /// Shared retry budget per mission request
    pub max_retries: u32,

    pub max_tokens: u64,

    pub temperature: f64,

    /// Accepted missions are written here
    pub log_directory: PathBuf,

    /// Per-session model-checker work files go under here
    pub work_dir: PathBuf,

    /// Mission schemas; the first one is the default
    pub schema: Vec<PathBuf>,

    /// Extra framing for the mission generator
    pub context_files: Vec<PathBuf>,

    /// Formal verification on/off
    pub ltl: bool,

    pub promela_template: Option<PathBuf>,

    pub spin_path: Option<PathBuf>,

    pub ltl2tgba_path: PathBuf,

    pub xmllint_path: PathBuf,

    /// Clause conjoined with every property before translation
    pub initial_condition: Option<String>,

    /// Accepting runs shown to the arbiter
    pub example_runs: usize,

    /// Ask a person instead of the arbiter model
    pub human_review: bool,

    pub checker: CheckerConfig,

    pub models: ModelConfig,

    /// Set from `LLM_API_KEY` / `OPENROUTER_API_KEY`
    #[serde(skip)]
    pub api_key: String,

    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: "INFO".to_string(),
            max_retries: 5,
            max_tokens: 2000,
            temperature: 0.2,
            log_directory: PathBuf::from("./missions"),
            work_dir: PathBuf::from("./work"),
            schema: Vec::new(),
            context_files: Vec::new(),
            ltl: false,
            promela_template: None,
            spin_path: None,
            ltl2tgba_path: PathBuf::from("ltl2tgba"),
            xmllint_path: PathBuf::from("xmllint"),
            initial_condition: None,
            example_runs: 5,
            human_review: false,
            checker: CheckerConfig::default(),
            models: ModelConfig::default(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load the YAML file at `path` and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no API key is set, and
    /// `ConfigError::InvalidValue` for settings that cannot work together.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, |key| std::env::var(key).ok())
    }

    /// Parse `text` with `env` as the environment lookup.
    pub fn from_yaml(text: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(text)?;

        config.api_key = env("LLM_API_KEY")
            .or_else(|| env("OPENROUTER_API_KEY"))
            .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;
        if let Some(url) = env("LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = env("MISSION_MODEL") {
            config.models.mission = model;
        }
        if let Some(model) = env("PROPERTY_MODEL") {
            config.models.property = model;
        }
        if let Some(model) = env("ARBITER_MODEL") {
            config.models.arbiter = model;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.schema.is_empty() {
            return Err(ConfigError::InvalidValue(
                "schema".to_string(),
                "at least one schema path is required".to_string(),
            ));
        }
        if self.example_runs == 0 {
            return Err(ConfigError::InvalidValue(
                "example_runs".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue(
                "temperature".to_string(),
                format!("{} is outside 0.0..=2.0", self.temperature),
            ));
        }
        if self.ltl && (self.promela_template.is_none() || self.spin_path.is_none()) {
            tracing::warn!(
                "No spin configuration found. Proceeding without formal verification..."
            );
            self.ltl = false;
        }
        Ok(())
    }

    /// `RUST_LOG`-style default directive for this crate.
    pub fn log_directive(&self) -> String {
        let level = match self.logging.to_ascii_uppercase().as_str() {
            "CRITICAL" | "ERROR" => "error",
            "WARNING" | "WARN" => "warn",
            "DEBUG" => "debug",
            "TRACE" => "trace",
            _ => "info",
        };
        format!("mission_planner={}", level)
    }

    /// Read a configured file into a string.
    pub fn read_file(path: &Path) -> Result<String, ConfigError> {
        std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

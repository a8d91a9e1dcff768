//! Configuration loading
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The binary applies its CLI flags last.
//!
//! ```toml
//! [llm]
//! model = "gpt-4o-mini"
//! temperature = 0.2
//!
//! [pipeline]
//! output_dir = "out"
//! max_concurrency = 2
//!
//! [search]
//! max_results = 5
//! ```
//!
//! API keys never live in the file; see [`Credentials`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use web_tools::{ScrapeConfig, SearchConfig};

use crate::error::PipelineError;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "EVENT_CREW_CONFIG";

const CONFIG_FILENAME: &str = "event-crew.toml";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories
/// 2. Global config at `<config_dir>/event-crew/config.toml`
fn find_config_file() -> Option<PathBuf> {
    if let Ok(current) = std::env::current_dir() {
        for dir in current.ancestors() {
            let candidate = dir.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    let global_path = dirs::config_dir()?.join("event-crew").join("config.toml");
    global_path.exists().then_some(global_path)
}

/// Top-level settings (from `event-crew.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// LLM configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible API root, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Pipeline section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Directory relative output files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Upper bound on concurrent tasks in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Revisions allowed per task before the last answer is accepted
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_revisions() -> usize {
    3
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrency: default_max_concurrency(),
            max_revisions: default_max_revisions(),
        }
    }
}

impl Settings {
    /// Load settings from the default locations and the environment
    ///
    /// `EVENT_CREW_CONFIG` wins over the directory walk. A missing file is
    /// not an error; a malformed one is.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut settings = match explicit.or_else(find_config_file) {
            Some(path) => {
                tracing::debug!("Loading settings from: {}", path.display());
                Self::load_from_path(&path)?
            }
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG_FILENAME);
                Self::default()
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `OPENAI_MODEL_NAME` and `OPENAI_API_BASE` overrides
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("OPENAI_MODEL_NAME").filter(|v| !v.trim().is_empty()) {
            self.llm.model = model;
        }
        if let Some(base) = lookup("OPENAI_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.llm.base_url = base.trim_end_matches('/').to_string();
        }
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.pipeline.max_concurrency == 0 {
            return Err(PipelineError::configuration(
                "pipeline.max_concurrency must be at least 1",
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(PipelineError::configuration("llm.model must not be empty"));
        }
        Ok(())
    }
}

/// Load a `.env` file from the working directory or a parent, if present
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            eprintln!("Ignoring malformed .env file: {}", e);
            None
        }
    }
}

/// API keys for the language model and the search provider
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub serper_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("serper_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub const OPENAI_API_KEY: &'static str = "OPENAI_API_KEY";
    pub const SERPER_API_KEY: &'static str = "SERPER_API_KEY";

    /// Read both keys from the process environment
    pub fn from_env() -> crate::error::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read both keys through `lookup`; missing or blank keys are fatal
    pub fn from_lookup<F>(lookup: F) -> crate::error::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    PipelineError::configuration(format!("{} not found in environment variables", key))
                })
        };

        Ok(Self {
            openai_api_key: require(Self::OPENAI_API_KEY)?,
            serper_api_key: require(Self::SERPER_API_KEY)?,
        })
    }
}

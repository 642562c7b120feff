use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite file holding the persisted check index.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    /// LLM provider used for generation: `gemini` or `openai`.
    pub llm_provider: String,
    /// Model reference within the provider (e.g. `models/gemini-1.5-flash`).
    pub llm_reference: String,
    pub timeout_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            llm_provider: "gemini".to_string(),
            llm_reference: "models/gemini-1.5-flash".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `gemini`, `openai`, `hash`, or `disabled`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of related checks retrieved as few-shot examples.
    pub num_related_checks: usize,
    /// Minimum similarity for a compliance requirement match.
    pub confidence_threshold: f32,
    /// Cap on checks attached to a single compliance requirement.
    pub max_checks_per_requirement: usize,
    /// Similarity at or above which a requested check is considered to
    /// already exist in the inventory.
    pub duplicate_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_related_checks: 4,
            confidence_threshold: 0.6,
            max_checks_per_requirement: 10,
            duplicate_threshold: 0.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8300".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.num_related_checks == 0 {
        anyhow::bail!("retrieval.num_related_checks must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.confidence_threshold) {
        anyhow::bail!("retrieval.confidence_threshold must be in [0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.retrieval.duplicate_threshold) {
        anyhow::bail!("retrieval.duplicate_threshold must be in [0.0, 1.0]");
    }

    if config.retrieval.max_checks_per_requirement == 0 {
        anyhow::bail!("retrieval.max_checks_per_requirement must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, openai, or hash.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.provider != "hash" {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.models.llm_provider.as_str() {
        "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Must be gemini or openai.",
            other
        ),
    }

    Ok(())
}

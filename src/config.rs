use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub parsing: ParsingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
    #[serde(default = "default_distance")]
    pub distance: String,
}

fn default_collection() -> String {
    "points".to_string()
}
fn default_vector_size() -> usize {
    1536
}
fn default_distance() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Opaque tag forwarded to the provider with every batch; the
    /// provider decides what it means (model variant, task hint).
    #[serde(default = "default_embedding_type")]
    pub embedding_type: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            embedding_type: "default".to_string(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_type() -> String {
    "default".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParsingConfig {
    #[serde(default = "default_min_paragraph_length")]
    pub min_paragraph_length: usize,
    #[serde(default = "default_max_paragraph_length")]
    pub max_paragraph_length: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_include_arrays")]
    pub include_arrays: bool,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            min_paragraph_length: default_min_paragraph_length(),
            max_paragraph_length: default_max_paragraph_length(),
            max_depth: default_max_depth(),
            include_arrays: default_include_arrays(),
        }
    }
}

fn default_min_paragraph_length() -> usize {
    50
}
fn default_max_paragraph_length() -> usize {
    2000
}
fn default_max_depth() -> usize {
    10
}
fn default_include_arrays() -> bool {
    true
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.vector_size == 0 {
        anyhow::bail!("store.vector_size must be > 0");
    }

    match config.store.distance.as_str() {
        "cosine" | "dot" => {}
        other => anyhow::bail!("Unknown distance: '{}'. Must be cosine or dot.", other),
    }

    if config.parsing.min_paragraph_length == 0 {
        anyhow::bail!("parsing.min_paragraph_length must be > 0");
    }
    if config.parsing.max_paragraph_length <= config.parsing.min_paragraph_length {
        anyhow::bail!("parsing.max_paragraph_length must exceed min_paragraph_length");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Value expected in the `X-API-Key` header. Empty disables the check.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_window_secs")]
    pub rate_window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub rate_max_requests: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: default_window_secs(),
            rate_max_requests: default_max_requests(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> usize {
    60
}
fn default_max_concurrent() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunk size (characters) for general-purpose splitting.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Smaller chunk size used when splitting for the retrieval index.
    #[serde(default = "default_index_chunk_size")]
    pub index_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            index_chunk_size: default_index_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_index_chunk_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunks returned per query.
    #[serde(default = "default_top_chunks")]
    pub top_chunks: usize,
    /// Token budget applied to context before it is sent upstream.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Maximum documents held in the in-memory index (LRU beyond this).
    #[serde(default = "default_index_capacity")]
    pub index_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_chunks: default_top_chunks(),
            max_context_tokens: default_max_context_tokens(),
            index_capacity: default_index_capacity(),
        }
    }
}

fn default_top_chunks() -> usize {
    3
}
fn default_max_context_tokens() -> usize {
    8196
}
fn default_index_capacity() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory for extracted-document JSON records.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_pdf_bytes: default_max_pdf_bytes(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_max_pdf_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate limits
    if config.limits.rate_window_secs == 0 {
        anyhow::bail!("limits.rate_window_secs must be > 0");
    }
    if config.limits.rate_max_requests == 0 {
        anyhow::bail!("limits.rate_max_requests must be > 0");
    }
    if config.limits.max_concurrent_requests == 0 {
        anyhow::bail!("limits.max_concurrent_requests must be > 0");
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 || config.chunking.index_chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size and chunking.index_chunk_size must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_chunks == 0 {
        anyhow::bail!("retrieval.top_chunks must be >= 1");
    }
    if config.retrieval.index_capacity == 0 {
        anyhow::bail!("retrieval.index_capacity must be >= 1");
    }

    // Validate llm
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    match config.llm.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be disabled or gemini.", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let f = write_config("[server]\nbind = \"127.0.0.1:8080\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.limits.rate_window_secs, 60);
        assert_eq!(config.limits.rate_max_requests, 60);
        assert_eq!(config.limits.max_concurrent_requests, 100);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.index_chunk_size, 500);
        assert_eq!(config.retrieval.top_chunks, 3);
        assert_eq!(config.retrieval.max_context_tokens, 8196);
        assert_eq!(config.llm.provider, "disabled");
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let f = write_config(
            "[server]\nbind = \"127.0.0.1:8080\"\n[limits]\nrate_max_requests = 0\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_llm_requires_model() {
        let f = write_config("[server]\nbind = \"127.0.0.1:8080\"\n[llm]\nprovider = \"gemini\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let f = write_config(
            "[server]\nbind = \"127.0.0.1:8080\"\n[llm]\nprovider = \"openai\"\nmodel = \"x\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}

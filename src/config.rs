//! Configuration parsing and validation.
//!
//! ragchat is configured with a TOML file (default `config/ragchat.toml`).
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [store]
//! backend = "sqlite"            # or "memory"
//!
//! [db]
//! path = "./data/ragchat.sqlite"
//!
//! [chunking]
//! chunk_size = 500              # characters
//! overlap = 50
//!
//! [retrieval]
//! top_k = 10
//! min_score = 0.2               # optional
//! diversify = true
//! max_context_chars = 6000
//!
//! [embedding]
//! provider = "hash"             # hash | openai | ollama | local
//! dims = 384
//!
//! [generation]
//! provider = "groq"             # disabled | openai | groq | huggingface
//! history_turns = 6
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! allowed_origins = ["*"]
//! ```

use anyhow::{bail, Context, Result};
use ragchat_core::chunk::ChunkingParams;
use ragchat_core::context::ENTRY_OVERHEAD_CHARS;
use ragchat_core::engine::EngineParams;
use ragchat_core::generate::GenerationParams;
use ragchat_core::ingest::IngestParams;
use ragchat_core::retrieve::RetrievalParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

fn default_store_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/ragchat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_min_content_chars() -> usize {
    10
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default = "default_oversample")]
    pub oversample: usize,
    #[serde(default = "default_true")]
    pub diversify: bool,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            oversample: default_oversample(),
            diversify: true,
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_oversample() -> usize {
    2
}
fn default_true() -> bool {
    true
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible or Ollama server).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Inputs longer than this are rejected before reaching the backend.
    #[serde(default)]
    pub max_input_chars: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Vector dimension for the configured provider. `hash` and `local`
    /// default to 384 (all-MiniLM-L6-v2); remote providers must set it.
    pub fn resolved_dims(&self) -> Option<usize> {
        match self.provider.as_str() {
            "hash" | "local" => Some(self.dims.unwrap_or(384)),
            _ => self.dims,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub answer_without_context: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: None,
            history_turns: default_history_turns(),
            answer_without_context: false,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_history_turns() -> usize {
    6
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// API key variable for the provider, honouring `api_key_env`.
    pub fn api_key_var(&self) -> &str {
        if let Some(ref var) = self.api_key_env {
            return var;
        }
        match self.provider.as_str() {
            "groq" => "GROQ_API_KEY",
            "huggingface" => "HUGGINGFACE_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Pipeline tuning for [`ragchat_core::RagEngine`].
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            ingest: IngestParams {
                chunking: ChunkingParams {
                    chunk_size: self.chunking.chunk_size,
                    overlap: self.chunking.overlap,
                },
                min_content_chars: self.ingest.min_content_chars,
                batch_size: self.ingest.batch_size,
            },
            retrieval: RetrievalParams {
                top_k: self.retrieval.top_k,
                min_score: self.retrieval.min_score,
                oversample: self.retrieval.oversample,
                diversify: self.retrieval.diversify,
            },
            generation: GenerationParams {
                history_turns: self.generation.history_turns,
                answer_without_context: self.generation.answer_without_context,
            },
            max_context_chars: self.retrieval.max_context_chars,
        }
    }
}

/// Read a config file, or return defaults if `path` does not exist and
/// `allow_missing` is set.
pub fn load_config_or_default(path: &Path, allow_missing: bool) -> Result<Config> {
    if allow_missing && !path.exists() {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }
    load_config(path)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check value ranges and provider names.
pub fn validate(config: &Config) -> Result<()> {
    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store.backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.oversample == 0 {
        bail!("retrieval.oversample must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }
    let min_context = config.chunking.chunk_size + ENTRY_OVERHEAD_CHARS;
    if config.retrieval.max_context_chars < min_context {
        bail!(
            "retrieval.max_context_chars ({}) must be at least chunking.chunk_size + {} ({})",
            config.retrieval.max_context_chars,
            ENTRY_OVERHEAD_CHARS,
            min_context
        );
    }

    match config.embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    match config.embedding.resolved_dims() {
        Some(d) if d > 0 => {}
        _ => bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" | "groq" | "huggingface" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, groq, or huggingface.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_tokens == 0 {
        bail!("generation.max_tokens must be > 0");
    }

    if config.server.max_upload_bytes == 0 {
        bail!("server.max_upload_bytes must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.embedding.resolved_dims(), Some(384));
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_engine_params_mapping() {
        let config = parse(
            r#"
            [chunking]
            chunk_size = 200
            overlap = 20

            [retrieval]
            top_k = 4
            min_score = 0.25
            diversify = false

            [generation]
            history_turns = 2
            "#,
        )
        .unwrap();
        let p = config.engine_params();
        assert_eq!(p.ingest.chunking.chunk_size, 200);
        assert_eq!(p.retrieval.top_k, 4);
        assert_eq!(p.retrieval.min_score, Some(0.25));
        assert!(!p.retrieval.diversify);
        assert_eq!(p.generation.history_turns, 2);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = parse("[chunking]\nchunk_size = 50\noverlap = 50\n").unwrap_err();
        assert!(err.to_string().contains("chunking.overlap"));
    }

    #[test]
    fn test_context_budget_must_fit_a_chunk() {
        for budget in [0, 100, 500] {
            let err = parse(&format!("[retrieval]\nmax_context_chars = {budget}\n")).unwrap_err();
            assert!(err.to_string().contains("retrieval.max_context_chars"), "{}", err);
        }
        assert!(parse("[chunking]\nchunk_size = 100\noverlap = 10\n[retrieval]\nmax_context_chars = 300\n").is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[generation]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[store]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn test_remote_embedding_needs_model_and_dims() {
        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 1536\n").is_err());
        assert!(parse("[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n").is_err());
        assert!(parse(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn test_api_key_var() {
        let mut g = GenerationConfig {
            provider: "groq".into(),
            ..GenerationConfig::default()
        };
        assert_eq!(g.api_key_var(), "GROQ_API_KEY");
        g.provider = "huggingface".into();
        assert_eq!(g.api_key_var(), "HUGGINGFACE_API_KEY");
        g.api_key_env = Some("MY_KEY".into());
        assert_eq!(g.api_key_var(), "MY_KEY");
    }

    #[test]
    fn test_missing_file_defaults_when_allowed() {
        let path = Path::new("/definitely/not/here.toml");
        assert!(load_config_or_default(path, true).is_ok());
        assert!(load_config_or_default(path, false).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/ragchat.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.generation.provider, "groq");
        assert_eq!(config.server.max_upload_bytes, 20 * 1024 * 1024);
    }
}

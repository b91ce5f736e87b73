use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub docgraph: DocgraphConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Storage and logging
#[derive(Debug, Clone, Deserialize)]
pub struct DocgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

/// Remote content service (Confluence REST API)
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

/// Text-generation provider chain
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Provider names in preference order; the first healthy one wins.
    #[serde(default = "default_provider_order")]
    pub order: Vec<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

/// Local/self-hosted provider
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

/// Hosted-API provider
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
        }
    }
}

/// Enrichment worker pool and extraction bounds
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default = "default_max_name_candidates")]
    pub max_name_candidates: usize,
    #[serde(default = "default_min_person_confidence")]
    pub min_person_confidence: f64,
    #[serde(default = "default_document_timeout")]
    pub document_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub retrieval_summary: bool,
    /// Bodies longer than this many characters are enriched chunk by chunk
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_keywords: default_max_keywords(),
            max_name_candidates: default_max_name_candidates(),
            min_person_confidence: default_min_person_confidence(),
            document_timeout_secs: default_document_timeout(),
            retrieval_summary: true,
            chunk_chars: default_chunk_chars(),
            chunk_overlap_chars: default_chunk_overlap_chars(),
            max_chunks: default_max_chunks(),
        }
    }
}

/// Relationship graph defaults
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_global_limit")]
    pub global_limit: usize,
    #[serde(default = "default_keyword_top_k")]
    pub keyword_network_top_k: usize,
    #[serde(default = "default_min_node_size")]
    pub min_node_size: u32,
    #[serde(default = "default_max_node_size")]
    pub max_node_size: u32,
    #[serde(default = "default_graph_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            global_limit: default_global_limit(),
            keyword_network_top_k: default_keyword_top_k(),
            min_node_size: default_min_node_size(),
            max_node_size: default_max_node_size(),
            cache_capacity: default_graph_cache_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_username_env() -> String {
    "CONFLUENCE_USER".to_string()
}

fn default_token_env() -> String {
    "CONFLUENCE_TOKEN".to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_remote_timeout() -> u64 {
    30
}

fn default_provider_order() -> Vec<String> {
    vec!["ollama".to_string(), "openai".to_string()]
}

fn default_provider_timeout() -> u64 {
    60
}

fn default_max_retries() -> usize {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "gemma3:4b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_max_keywords() -> usize {
    15
}

fn default_max_name_candidates() -> usize {
    20
}

fn default_min_person_confidence() -> f64 {
    0.3
}

fn default_document_timeout() -> u64 {
    300
}

fn default_chunk_chars() -> usize {
    2000
}

fn default_chunk_overlap_chars() -> usize {
    200
}

fn default_max_chunks() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.2
}

fn default_global_limit() -> usize {
    100
}

fn default_keyword_top_k() -> usize {
    50
}

fn default_min_node_size() -> u32 {
    10
}

fn default_max_node_size() -> u32 {
    50
}

fn default_graph_cache_capacity() -> usize {
    64
}

pub const KNOWN_PROVIDERS: &[&str] = &["ollama", "openai"];

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DOCGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DOCGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Parse and validate a specific config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.remote.base_url.trim().is_empty() {
            anyhow::bail!("remote.base_url must not be empty");
        }
        url::Url::parse(&self.remote.base_url)
            .with_context(|| format!("remote.base_url is not a valid URL: {}", self.remote.base_url))?;

        if self.remote.page_size == 0 {
            anyhow::bail!("remote.page_size must be greater than 0");
        }

        if self.providers.order.is_empty() {
            anyhow::bail!("providers.order must list at least one provider");
        }
        for name in &self.providers.order {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                anyhow::bail!(
                    "providers.order contains unknown provider '{}' (known: {})",
                    name,
                    KNOWN_PROVIDERS.join(", ")
                );
            }
        }
        if self.providers.max_retries > 5 {
            anyhow::bail!("providers.max_retries must be at most 5");
        }

        if self.enrichment.concurrency == 0 {
            anyhow::bail!("enrichment.concurrency must be greater than 0");
        }
        if self.enrichment.max_keywords == 0 || self.enrichment.max_keywords > 50 {
            anyhow::bail!("enrichment.max_keywords must be between 1 and 50");
        }
        if !(0.0..=1.0).contains(&self.enrichment.min_person_confidence) {
            anyhow::bail!("enrichment.min_person_confidence must be between 0.0 and 1.0");
        }
        if self.enrichment.chunk_chars < 200 {
            anyhow::bail!("enrichment.chunk_chars must be at least 200");
        }
        if self.enrichment.chunk_overlap_chars * 2 > self.enrichment.chunk_chars {
            anyhow::bail!("enrichment.chunk_overlap_chars must be at most half of chunk_chars");
        }
        if self.enrichment.max_chunks == 0 {
            anyhow::bail!("enrichment.max_chunks must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.graph.threshold) {
            anyhow::bail!("graph.threshold must be between 0.0 and 1.0");
        }
        if self.graph.min_node_size > self.graph.max_node_size {
            anyhow::bail!("graph.min_node_size must not exceed graph.max_node_size");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.docgraph.db_path
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.docgraph.migrations_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[docgraph]
db_path = "./test.db"

[remote]
base_url = "https://wiki.example.com"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.docgraph.log_level, "info");
        assert_eq!(config.remote.page_size, 50);
        assert_eq!(config.providers.order, vec!["ollama", "openai"]);
        assert_eq!(config.providers.max_retries, 2);
        assert_eq!(config.enrichment.max_keywords, 15);
        assert_eq!(config.enrichment.chunk_chars, 2000);
        assert_eq!(config.enrichment.max_chunks, 5);
        assert!((config.graph.threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.graph.min_node_size, 10);
        assert_eq!(config.graph.max_node_size, 50);
    }

    #[test]
    fn test_full_config() {
        let raw = r#"
[docgraph]
db_path = "./data/pages.db"
log_level = "debug"

[remote]
base_url = "http://localhost:8090"
page_size = 25

[providers]
order = ["openai"]
max_retries = 3

[providers.openai]
model = "gpt-4o"

[enrichment]
concurrency = 8
retrieval_summary = false

[graph]
threshold = 0.3
keyword_network_top_k = 20
"#;
        let config = Config::from_toml(raw).unwrap();
        assert_eq!(config.docgraph.log_level, "debug");
        assert_eq!(config.remote.page_size, 25);
        assert_eq!(config.providers.order, vec!["openai"]);
        assert_eq!(config.providers.openai.model, "gpt-4o");
        assert_eq!(config.providers.ollama.model, "gemma3:4b");
        assert_eq!(config.enrichment.concurrency, 8);
        assert!(!config.enrichment.retrieval_summary);
        assert_eq!(config.graph.keyword_network_top_k, 20);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let raw = format!("{}\n[graph]\nthreshold = 1.5\n", MINIMAL);
        let err = Config::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("graph.threshold"));
    }

    #[test]
    fn test_chunk_overlap_bounded_by_window() {
        let raw = format!(
            "{}\n[enrichment]\nchunk_chars = 400\nchunk_overlap_chars = 300\n",
            MINIMAL
        );
        let err = Config::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap_chars"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let raw = format!("{}\n[providers]\norder = [\"claude-local\"]\n", MINIMAL);
        let err = Config::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let raw = format!("{}\n[enrichment]\nconcurrency = 0\n", MINIMAL);
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("docgraph.toml");
        fs::write(&config_path, MINIMAL).unwrap();

        let original = std::env::var("DOCGRAPH_CONFIG").ok();
        std::env::set_var("DOCGRAPH_CONFIG", &config_path);
        let config = Config::load();
        std::env::remove_var("DOCGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("DOCGRAPH_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.db_path(), Path::new("./test.db"));
        assert_eq!(config.migrations_dir(), Path::new("migrations"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("DOCGRAPH_CONFIG").ok();
        std::env::set_var("DOCGRAPH_CONFIG", "nonexistent.toml");
        let config = Config::load();
        std::env::remove_var("DOCGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("DOCGRAPH_CONFIG", v);
        }
        assert!(config.is_err());
    }
}

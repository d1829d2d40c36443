use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_MESSAGE_CHARS: usize = 10_000;
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const EMBEDDING_DIMENSIONS: u64 = 768;

/// Top-level config (convoy.toml + CONVOY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            quota: QuotaConfig::default(),
            memory: MemoryConfig::default(),
            llm: LlmConfig::default(),
            vector: VectorConfig::default(),
            storage: StorageConfig::default(),
            ingestion: IngestionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
    #[serde(default = "default_quota_ttl")]
    pub ttl_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            ttl_secs: default_quota_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "default_summary_budget")]
    pub summary_budget: u32,
    #[serde(default = "default_message_threshold")]
    pub message_count_threshold: u32,
    #[serde(default = "default_token_threshold")]
    pub token_threshold: u32,
    #[serde(default = "default_resummarize_delta")]
    pub resummarize_delta_messages: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            summary_budget: default_summary_budget(),
            message_count_threshold: default_message_threshold(),
            token_threshold: default_token_threshold(),
            resummarize_delta_messages: default_resummarize_delta(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    /// `local`, `gemini`, or `claude`.
    #[serde(default = "default_provider")]
    pub primary_provider: String,
    pub fallback_provider: Option<String>,
    #[serde(default)]
    pub local: LocalProviderConfig,
    pub gemini: Option<ExternalProviderConfig>,
    pub claude: Option<ExternalProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProviderConfig {
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    #[serde(default = "default_local_model")]
    pub model: String,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            collection_name: default_collection_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_blob_root")]
    pub blob_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: default_blob_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_parse_concurrency")]
    pub parse_concurrency: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            parse_concurrency: default_parse_concurrency(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.convoy/convoy.db")
}
fn default_capacity() -> f64 {
    20.0
}
fn default_refill_rate() -> f64 {
    1.0
}
fn default_quota_ttl() -> u64 {
    60
}
fn default_max_context_tokens() -> u32 {
    8_000
}
fn default_summary_budget() -> u32 {
    500
}
fn default_message_threshold() -> u32 {
    50
}
fn default_token_threshold() -> u32 {
    6_000
}
fn default_resummarize_delta() -> u32 {
    20
}
fn default_provider() -> String {
    "local".to_string()
}
fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_local_model() -> String {
    "llama3".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection_name() -> String {
    "convoy_chunks".to_string()
}
fn default_blob_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.convoy/blobs")
}
fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_parse_concurrency() -> usize {
    2
}

impl Config {
    /// Load config from a TOML file with CONVOY_* env var overrides.
    /// Checks the explicit path argument, else `~/.convoy/convoy.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Config = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONVOY_").split("__"))
            .extract()
            .map_err(|e| crate::error::ApiError::Internal(format!("config error: {e}")))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.convoy/convoy.toml")
}

//! Service configuration loaded from an optional `config` file and
//! `LECTERN__*` environment variables.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_ollama")]
    pub ollama: OllamaConfig,

    #[serde(default = "default_embeddings")]
    pub embeddings: EmbeddingsConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_retrieval")]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Staging location for uploaded files. Each ingestion run writes into
    /// its own subdirectory.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

/// Ollama configuration (embedding, vision and generation models)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Vision model for image descriptions (e.g., llava, moondream). Empty means no image chunks.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl OllamaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Embeddings configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Fixed embedding dimensionality. When unset the first appended chunk establishes it.
    #[serde(default)]
    pub dimension: Option<usize>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_files_per_upload")]
    pub max_files_per_upload: usize,

    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_bytes: u64,
}

/// Retrieval and answering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_answer_format")]
    pub default_answer_format: String,
}

/// Ingestion run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub corpus_mode: CorpusMode,
}

/// What a new ingestion run does with the existing corpus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusMode {
    #[default]
    Replace,
    Append,
}

impl AppConfig {
    /// Load configuration from `config.*` (optional) and `LECTERN__` env vars
    pub fn load() -> ServiceResult<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("LECTERN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.embeddings.chunk_size == 0 {
            return Err(ServiceError::Config {
                message: "embeddings.chunk_size must be greater than zero".to_string(),
            });
        }
        if self.embeddings.chunk_overlap >= self.embeddings.chunk_size {
            return Err(ServiceError::Config {
                message: "embeddings.chunk_overlap must be smaller than embeddings.chunk_size"
                    .to_string(),
            });
        }
        if self.retrieval.top_n == 0 {
            return Err(ServiceError::Config {
                message: "retrieval.top_n must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            ollama: default_ollama(),
            embeddings: default_embeddings(),
            limits: default_limits(),
            retrieval: default_retrieval(),
            ingestion: IngestionConfig::default(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        upload_dir: default_upload_dir(),
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_ollama() -> OllamaConfig {
    OllamaConfig {
        base_url: default_ollama_url(),
        generation_model: default_generation_model(),
        vision_model: default_vision_model(),
        temperature: default_temperature(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_generation_model() -> String {
    "gemma2".to_string()
}

fn default_vision_model() -> String {
    "llava".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_embeddings() -> EmbeddingsConfig {
    EmbeddingsConfig {
        model: default_embedding_model(),
        dimension: None,
        chunk_size: default_chunk_size(),
        chunk_overlap: default_chunk_overlap(),
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_chunk_size() -> usize {
    256
}

fn default_chunk_overlap() -> usize {
    32
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_files_per_upload: default_max_files_per_upload(),
        max_upload_size_bytes: default_max_upload_size(),
    }
}

fn default_max_files_per_upload() -> usize {
    10
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

fn default_retrieval() -> RetrievalConfig {
    RetrievalConfig {
        top_n: default_top_n(),
        default_answer_format: default_answer_format(),
    }
}

fn default_top_n() -> usize {
    3
}

fn default_answer_format() -> String {
    "Provide a detailed answer based on the context".to_string()
}

//! Service coordinator owning the shared corpus and ingestion status.
//!
//! All mutable state lives in a [`LecternService`] instance, so tests build a
//! fresh one per case with fake providers.

mod pipeline;
pub mod prompts;
mod query;
mod upload;

pub use pipeline::IngestionPipeline;
pub use query::{AnswerSource, QueryPipeline};
pub use upload::{UploadAccepted, UploadedFile};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::corpus::CorpusStore;
use crate::error::ServiceResult;
use crate::ingestion::DocumentExtractor;
use crate::ollama::OllamaClient;
use crate::progress::ProgressTracker;
use crate::provider::{EmbeddingProvider, GenerativeModel};

/// Main service coordinator
pub struct LecternService {
    pub config: Arc<AppConfig>,
    pub corpus: Arc<CorpusStore>,
    pub progress: Arc<ProgressTracker>,
    pub pipeline: Arc<IngestionPipeline>,
    pub query: QueryPipeline,
    generator: Arc<dyn GenerativeModel>,
}

impl LecternService {
    /// Create a service backed by Ollama
    pub async fn new(config: Arc<AppConfig>) -> ServiceResult<Self> {
        info!("Initializing Lectern service");

        let ollama = Arc::new(OllamaClient::new(
            config.ollama.clone(),
            &config.embeddings,
        )?);

        if ollama.health_check().await {
            info!(url = %config.ollama.base_url, "Ollama is available");
        } else {
            warn!(url = %config.ollama.base_url, "Ollama is not available");
        }

        Ok(Self::with_providers(config, ollama.clone(), ollama))
    }

    /// Create a service with explicit providers
    pub fn with_providers(
        config: Arc<AppConfig>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerativeModel>,
    ) -> Self {
        let corpus = Arc::new(CorpusStore::new(config.embeddings.dimension));
        let progress = Arc::new(ProgressTracker::new());

        let pipeline = Arc::new(IngestionPipeline::new(
            DocumentExtractor::new(&config.embeddings),
            embedder.clone(),
            corpus.clone(),
            progress.clone(),
            config.ingestion.corpus_mode,
        ));

        let query = QueryPipeline::new(
            embedder,
            generator.clone(),
            corpus.clone(),
            &config.retrieval,
        );

        Self {
            config,
            corpus,
            progress,
            pipeline,
            query,
            generator,
        }
    }

    /// Whether the generative model is reachable
    pub async fn provider_available(&self) -> bool {
        self.generator.is_available().await
    }
}

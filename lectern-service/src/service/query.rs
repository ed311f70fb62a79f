//! Retrieval-augmented answering.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::corpus::{ChunkKind, CorpusStore, ScoredChunk};
use crate::error::{ServiceError, ServiceResult};
use crate::provider::{EmbeddingProvider, GenerativeModel};

use super::prompts::build_answer_prompt;

/// Generated answer plus the context it was conditioned on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context: String,
    pub sources: Vec<AnswerSource>,
}

/// A retrieved chunk, in ranked order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub document_id: String,
    pub page_index: usize,
    pub kind: ChunkKind,
    pub score: f32,
}

impl From<&ScoredChunk> for AnswerSource {
    fn from(result: &ScoredChunk) -> Self {
        Self {
            document_id: result.chunk.document_id.clone(),
            page_index: result.chunk.page_index,
            kind: result.chunk.kind,
            score: result.score,
        }
    }
}

pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerativeModel>,
    corpus: Arc<CorpusStore>,
    top_n: usize,
    default_answer_format: String,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerativeModel>,
        corpus: Arc<CorpusStore>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            corpus,
            top_n: config.top_n,
            default_answer_format: config.default_answer_format.clone(),
        }
    }

    /// Answer `question` from the top-ranked chunks of the corpus.
    ///
    /// A blank or missing `answer_format` falls back to the configured default.
    pub async fn answer(
        &self,
        question: &str,
        answer_format: Option<&str>,
    ) -> ServiceResult<Answer> {
        let started = Instant::now();
        let result = self.run(question, answer_format).await;
        histogram!("lectern_query_duration_seconds").record(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "answered",
            Err(ServiceError::EmptyCorpus) => "empty_corpus",
            Err(e) if e.is_provider_failure() => "provider_error",
            Err(_) => "error",
        };
        counter!("lectern_queries_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(answer) => info!(
                sources = answer.sources.len(),
                answer_length = answer.answer.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Query answered"
            ),
            Err(e) => warn!(error = %e, outcome, "Query failed"),
        }

        result
    }

    async fn run(&self, question: &str, answer_format: Option<&str>) -> ServiceResult<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "question must not be empty".to_string(),
            });
        }

        // Checked up front so an empty corpus never costs an embedding call
        if self.corpus.is_empty() {
            return Err(ServiceError::EmptyCorpus);
        }

        let answer_format = answer_format
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(self.default_answer_format.as_str());

        let query_embedding = self.embedder.embed_text(question).await?;
        let results = self.corpus.search(&query_embedding, self.top_n)?;

        let context = results
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            results = results.len(),
            top_score = results.first().map(|r| r.score),
            context_length = context.len(),
            "Context assembled"
        );

        let prompt = build_answer_prompt(question, &context, answer_format);
        let answer = self.generator.generate(&prompt).await?;

        Ok(Answer {
            answer,
            context,
            sources: results.iter().map(AnswerSource::from).collect(),
        })
    }
}

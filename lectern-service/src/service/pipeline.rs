//! Background ingestion: extract → describe → embed → append.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CorpusMode;
use crate::corpus::{CorpusStore, NewChunk};
use crate::error::{IngestionStage, ServiceError, ServiceResult, format_error_chain};
use crate::ingestion::{DocumentExtractor, ExtractionReport, Page, SourceDocument};
use crate::progress::{ProgressTracker, run_progress};
use crate::provider::EmbeddingProvider;

/// Totals for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Proof that the caller moved the tracker into `Running`.
///
/// Consumed when the run completes or fails. Dropping an unfinished ticket
/// marks the run failed so the status never stays stuck in progress.
pub struct IngestionTicket {
    progress: Arc<ProgressTracker>,
    finished: bool,
}

impl IngestionTicket {
    fn complete(mut self, chunks: usize) {
        self.finished = true;
        self.progress.complete(chunks);
    }

    fn fail(mut self, error: String) {
        self.finished = true;
        self.progress.fail(error);
    }
}

impl Drop for IngestionTicket {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Ingestion run abandoned before it started processing");
            self.progress
                .fail("Ingestion run ended before processing started".to_string());
        }
    }
}

/// Orchestrates extraction, embedding and corpus insertion for one folder at a time
pub struct IngestionPipeline {
    extractor: DocumentExtractor,
    embedder: Arc<dyn EmbeddingProvider>,
    corpus: Arc<CorpusStore>,
    progress: Arc<ProgressTracker>,
    corpus_mode: CorpusMode,
}

impl IngestionPipeline {
    pub fn new(
        extractor: DocumentExtractor,
        embedder: Arc<dyn EmbeddingProvider>,
        corpus: Arc<CorpusStore>,
        progress: Arc<ProgressTracker>,
        corpus_mode: CorpusMode,
    ) -> Self {
        Self {
            extractor,
            embedder,
            corpus,
            progress,
            corpus_mode,
        }
    }

    /// Claim the single ingestion slot. Fails with `IngestionInProgress` if a run is active.
    pub fn begin(&self) -> ServiceResult<IngestionTicket> {
        self.progress.try_begin()?;
        Ok(IngestionTicket {
            progress: self.progress.clone(),
            finished: false,
        })
    }

    /// Run ingestion of an upload staging folder as a detached background task.
    ///
    /// The folder is removed once the run ends, before the final status is
    /// published.
    pub fn spawn(self: &Arc<Self>, ticket: IngestionTicket, folder: PathBuf) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = pipeline.ingest(&folder).await;
            remove_staging_dir(&folder).await;
            // Outcome is recorded in the progress tracker
            let _ = pipeline.finish(ticket, result, started);
        })
    }

    /// Ingest `folder` and record the outcome in the progress tracker
    pub async fn run(
        &self,
        ticket: IngestionTicket,
        folder: &Path,
    ) -> ServiceResult<IngestionSummary> {
        let started = Instant::now();
        let result = self.ingest(folder).await;
        self.finish(ticket, result, started)
    }

    fn finish(
        &self,
        ticket: IngestionTicket,
        result: ServiceResult<IngestionSummary>,
        started: Instant,
    ) -> ServiceResult<IngestionSummary> {
        histogram!("lectern_ingestion_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(summary) => {
                ticket.complete(summary.chunks);
                counter!("lectern_ingestion_runs_total", "outcome" => "completed").increment(1);
                info!(
                    documents = summary.documents,
                    chunks = summary.chunks,
                    skipped = summary.skipped,
                    corpus_size = self.corpus.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Ingestion run complete"
                );
                Ok(summary)
            }
            Err(e) => {
                let message = format_error_chain(&e);
                error!(error = %message, corpus_size = self.corpus.len(), "Ingestion run failed");
                ticket.fail(message);
                counter!("lectern_ingestion_runs_total", "outcome" => "failed").increment(1);
                Err(e)
            }
        }
    }

    async fn ingest(&self, folder: &Path) -> ServiceResult<IngestionSummary> {
        info!(folder = %folder.display(), mode = ?self.corpus_mode, "Ingestion run started");

        let extractor = self.extractor.clone();
        let source = folder.to_path_buf();
        let report = tokio::task::spawn_blocking(move || extractor.extract(&source))
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Extraction task failed: {}", e),
            })?
            .map_err(|e| ServiceError::Ingestion {
                file: folder.display().to_string(),
                page: None,
                stage: IngestionStage::Extraction,
                source: Box::new(e.into()),
            })?;

        self.ingest_report(report).await
    }

    /// Embed and store extracted documents in document, page, chunk order
    async fn ingest_report(&self, report: ExtractionReport) -> ServiceResult<IngestionSummary> {
        let skipped = report.skipped.len();
        counter!("lectern_files_skipped_total").increment(skipped as u64);
        self.progress.record_skipped(report.skipped);

        if self.corpus_mode == CorpusMode::Replace {
            self.corpus.clear();
        }

        let total_documents = report.documents.len();
        let mut chunks = 0;

        for (doc_index, document) in report.documents.iter().enumerate() {
            let total_pages = document.pages.len();

            for (page_position, page) in document.pages.iter().enumerate() {
                chunks += self.ingest_page(document, page).await?;
                self.progress.page_completed(
                    &document.id,
                    page.index,
                    run_progress(doc_index, page_position + 1, total_pages, total_documents),
                    chunks,
                );
            }

            counter!("lectern_documents_ingested_total").increment(1);
            info!(document = %document.id, pages = total_pages, chunks, "Document ingested");
        }

        Ok(IngestionSummary {
            documents: total_documents,
            chunks,
            skipped,
        })
    }

    /// Embed and append every chunk of one page, in order
    async fn ingest_page(&self, document: &SourceDocument, page: &Page) -> ServiceResult<usize> {
        let stage_error = |stage: IngestionStage, source: ServiceError| ServiceError::Ingestion {
            file: document.id.clone(),
            page: Some(page.index),
            stage,
            source: Box::new(source),
        };

        let drafts = self
            .extractor
            .page_chunks(page, self.embedder.as_ref())
            .await
            .map_err(|e| stage_error(IngestionStage::ImageDescription, e.into()))?;

        let count = drafts.len();
        for draft in drafts {
            let embedding = self
                .embedder
                .embed_text(&draft.text)
                .await
                .map_err(|e| stage_error(IngestionStage::Embedding, e.into()))?;

            self.corpus
                .append(NewChunk {
                    kind: draft.kind,
                    document_id: document.id.clone(),
                    page_index: page.index,
                    text: draft.text,
                    embedding,
                })
                .map_err(|e| stage_error(IngestionStage::Storage, e))?;
        }

        counter!("lectern_chunks_ingested_total").increment(count as u64);
        Ok(count)
    }
}

/// Delete an upload staging folder. Failures are logged, not returned.
pub(super) async fn remove_staging_dir(folder: &Path) {
    match tokio::fs::remove_dir_all(folder).await {
        Ok(()) => debug!(folder = %folder.display(), "Staging folder removed"),
        Err(e) => warn!(folder = %folder.display(), error = %e, "Failed to remove staging folder"),
    }
}

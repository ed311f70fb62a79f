//! Process-wide ingestion status.
//!
//! The status lives in a `tokio::sync::watch` channel: the ingestion pipeline
//! is the only writer, pollers read the latest value and subscribers get
//! every change pushed to them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Lifecycle of the current (or last) ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// A file the extractor could not use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// Ingestion status payload
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStatus {
    pub in_progress: bool,
    pub progress: u8,
    pub current_file: Option<String>,
    pub current_page: Option<usize>,
    pub state: IngestionState,
    pub chunks_ingested: usize,
    pub skipped: Vec<SkippedFile>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Highest progress value reported while a run is still going
const MAX_RUNNING_PROGRESS: u8 = 99;

/// Owner of the ingestion status channel
pub struct ProgressTracker {
    sender: watch::Sender<IngestionStatus>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(IngestionStatus::default());
        Self { sender }
    }

    /// Latest status
    pub fn snapshot(&self) -> IngestionStatus {
        self.sender.borrow().clone()
    }

    /// Receive every subsequent status change
    pub fn subscribe(&self) -> watch::Receiver<IngestionStatus> {
        self.sender.subscribe()
    }

    /// Transition to `Running`, unless a run is already in progress.
    ///
    /// The check and the transition happen under the channel's lock, so two
    /// concurrent callers cannot both start a run.
    pub fn try_begin(&self) -> ServiceResult<()> {
        let started = self.sender.send_if_modified(|status| {
            if status.in_progress {
                return false;
            }
            *status = IngestionStatus {
                in_progress: true,
                progress: 0,
                state: IngestionState::Running,
                started_at: Some(Utc::now()),
                ..IngestionStatus::default()
            };
            true
        });

        if started {
            Ok(())
        } else {
            Err(ServiceError::IngestionInProgress)
        }
    }

    /// Record extraction skips for the running run
    pub fn record_skipped(&self, skipped: Vec<SkippedFile>) {
        if skipped.is_empty() {
            return;
        }
        self.sender.send_modify(|status| status.skipped.extend(skipped));
    }

    /// Record a finished page. Progress is clamped so it never decreases and
    /// never reaches 100 before completion.
    pub fn page_completed(&self, file: &str, page: usize, progress: u8, chunks_ingested: usize) {
        self.sender.send_modify(|status| {
            status.current_file = Some(file.to_string());
            status.current_page = Some(page);
            status.progress = status.progress.max(progress.min(MAX_RUNNING_PROGRESS));
            status.chunks_ingested = chunks_ingested;
        });
        debug!(file = %file, page, progress, "Ingestion progress");
    }

    /// Mark the run completed
    pub fn complete(&self, chunks_ingested: usize) {
        self.sender.send_modify(|status| {
            status.in_progress = false;
            status.progress = 100;
            status.state = IngestionState::Completed;
            status.chunks_ingested = chunks_ingested;
            status.finished_at = Some(Utc::now());
        });
    }

    /// Mark the run failed, keeping the last reported progress
    pub fn fail(&self, error: String) {
        self.sender.send_modify(|status| {
            status.in_progress = false;
            status.state = IngestionState::Failed;
            status.error = Some(error);
            status.finished_at = Some(Utc::now());
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall run progress after `pages_done` of `pages_total` pages of the
/// document at `doc_index` (0-based) out of `docs_total` documents.
pub fn run_progress(doc_index: usize, pages_done: usize, pages_total: usize, docs_total: usize) -> u8 {
    if docs_total == 0 {
        return MAX_RUNNING_PROGRESS;
    }
    let doc_fraction = if pages_total == 0 {
        1.0
    } else {
        pages_done.min(pages_total) as f64 / pages_total as f64
    };
    let overall = (doc_index as f64 + doc_fraction) / docs_total as f64;
    ((overall * 100.0).floor() as u8).min(MAX_RUNNING_PROGRESS)
}

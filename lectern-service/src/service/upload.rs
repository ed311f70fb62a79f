//! Upload staging and ingestion trigger.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::ingestion::hash::compute_content_hash;
use crate::ingestion::sanitize_filename;
use crate::service::LecternService;

use super::pipeline::remove_staging_dir;

/// A file received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Acknowledgment returned as soon as the background run is started
#[derive(Debug, Clone, Serialize)]
pub struct UploadAccepted {
    pub message: String,
    pub run_id: String,
    /// Staged file names, in upload order
    pub files: Vec<String>,
    pub duplicates_skipped: usize,
}

impl LecternService {
    /// Stage uploaded files and start a background ingestion run over them.
    ///
    /// The file count is checked and the ingestion slot claimed before
    /// anything is written, so a rejected request leaves no trace on disk.
    pub async fn ingest_uploads(&self, files: Vec<UploadedFile>) -> ServiceResult<UploadAccepted> {
        if files.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "no files provided".to_string(),
            });
        }

        let max = self.config.limits.max_files_per_upload;
        if files.len() > max {
            return Err(ServiceError::TooManyFiles {
                count: files.len(),
                max,
            });
        }

        let ticket = self.pipeline.begin()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let staging_dir = self.config.storage.upload_dir.join(&run_id);
        tokio::fs::create_dir_all(&staging_dir).await?;

        let (staged, duplicates_skipped) = match stage_files(&staging_dir, files).await {
            Ok(staged) => staged,
            Err(e) => {
                remove_staging_dir(&staging_dir).await;
                return Err(e.into());
            }
        };

        info!(
            run_id = %run_id,
            files = staged.len(),
            duplicates_skipped,
            dir = %staging_dir.display(),
            "Upload staged, starting ingestion"
        );

        self.pipeline.spawn(ticket, staging_dir);

        Ok(UploadAccepted {
            message: "Ingestion started".to_string(),
            run_id,
            files: staged,
            duplicates_skipped,
        })
    }
}

/// Write `files` into `dir`, skipping byte-identical duplicates and
/// prefixing colliding names. Returns the staged names and the duplicate count.
async fn stage_files(dir: &Path, files: Vec<UploadedFile>) -> io::Result<(Vec<String>, usize)> {
    let mut hashes = HashSet::new();
    let mut names = HashSet::new();
    let mut staged = Vec::with_capacity(files.len());
    let mut duplicates_skipped = 0;

    for file in files {
        let hash = compute_content_hash(&file.data);
        if !hashes.insert(hash) {
            debug!(file = %file.filename, "Skipping duplicate upload");
            duplicates_skipped += 1;
            continue;
        }

        let base = sanitize_filename(&file.filename);
        let mut name = base.clone();
        let mut suffix = 1;
        while !names.insert(name.clone()) {
            name = format!("{}_{}", suffix, base);
            suffix += 1;
        }

        tokio::fs::write(dir.join(&name), &file.data).await?;
        staged.push(name);
    }

    Ok((staged, duplicates_skipped))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::AppConfig;
    use crate::progress::{IngestionState, IngestionStatus};
    use crate::provider::fakes::{FailingEmbedder, HashEmbedder, RecordingGenerator};

    fn service_in(dir: &TempDir) -> LecternService {
        let mut config = AppConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        LecternService::with_providers(
            Arc::new(config),
            Arc::new(HashEmbedder::new(16)),
            Arc::new(RecordingGenerator::new("answer")),
        )
    }

    fn text_file(name: &str, content: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            data: content.as_bytes().to_vec(),
        }
    }

    async fn wait_until_finished(service: &LecternService) -> IngestionStatus {
        let mut receiver = service.progress.subscribe();
        receiver
            .wait_for(|s| matches!(s.state, IngestionState::Completed | IngestionState::Failed))
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_eleven_files_rejected_before_processing() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);

        let files = (0..11)
            .map(|i| text_file(&format!("doc{i}.txt"), &format!("content {i}")))
            .collect();

        let err = service.ingest_uploads(files).await.unwrap_err();
        assert!(matches!(err, ServiceError::TooManyFiles { count: 11, max: 10 }));
        assert_eq!(service.progress.snapshot().state, IngestionState::Idle);
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);

        assert!(matches!(
            service.ingest_uploads(Vec::new()).await,
            Err(ServiceError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_stages_dedupes_and_ingests() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);

        let accepted = service
            .ingest_uploads(vec![
                text_file("../notes.txt", "alpha beta"),
                text_file("copy.txt", "alpha beta"),
                text_file("sub/notes.txt", "gamma delta"),
            ])
            .await
            .unwrap();

        assert_eq!(accepted.files, vec!["notes.txt", "1_notes.txt"]);
        assert_eq!(accepted.duplicates_skipped, 1);

        let status = wait_until_finished(&service).await;
        assert_eq!(status.state, IngestionState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.current_file.as_deref(), Some("notes.txt"));
        assert_eq!(service.corpus.len(), 2);

        let answer = service.query.answer("alpha?", None).await.unwrap();
        assert_eq!(answer.answer, "answer");
    }

    #[tokio::test]
    async fn test_upload_rejected_while_run_in_progress() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);

        let _ticket = service.pipeline.begin().unwrap();
        let err = service
            .ingest_uploads(vec![text_file("a.txt", "alpha")])
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::IngestionInProgress));
        assert!(!dir.path().join("uploads").exists());
    }

    fn staging_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("uploads")).unwrap().count()
    }

    #[tokio::test]
    async fn test_completed_runs_leave_no_staging_folders() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir);

        for round in 0..3 {
            service
                .ingest_uploads(vec![text_file("a.txt", &format!("round {round}"))])
                .await
                .unwrap();
            let status = wait_until_finished(&service).await;
            assert_eq!(status.state, IngestionState::Completed);
        }

        assert_eq!(staging_entries(&dir), 0);
        assert_eq!(service.corpus.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_leaves_no_staging_folder() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.upload_dir = dir.path().join("uploads");
        let service = LecternService::with_providers(
            Arc::new(config),
            Arc::new(FailingEmbedder::new(16, 0)),
            Arc::new(RecordingGenerator::new("answer")),
        );

        service
            .ingest_uploads(vec![text_file("a.txt", "alpha beta")])
            .await
            .unwrap();

        let status = wait_until_finished(&service).await;
        assert_eq!(status.state, IngestionState::Failed);
        assert_eq!(staging_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_stage_files_fails_when_folder_is_missing() {
        let dir = TempDir::new().unwrap();
        let result = stage_files(&dir.path().join("missing"), vec![text_file("a.txt", "alpha")]).await;
        assert!(result.is_err());
    }
}

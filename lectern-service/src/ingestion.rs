//! Document extraction: source folder → documents → pages → chunk drafts.

pub mod hash;
mod pdf;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::EmbeddingsConfig;
use crate::corpus::ChunkKind;
use crate::error::{ExtractionError, ProviderError, format_error_chain};
use crate::progress::SkippedFile;
use crate::provider::EmbeddingProvider;

/// A parsed source document
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name
    pub id: String,
    pub pages: Vec<Page>,
}

/// One page of a source document
#[derive(Debug, Clone)]
pub struct Page {
    pub document_id: String,
    /// 0-based
    pub index: usize,
    pub text: String,
    /// Embedded images, PNG-encoded
    pub images: Vec<Vec<u8>>,
}

/// Outcome of extracting a folder: parsed documents plus the files that were skipped
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedFile>,
}

/// Chunk content awaiting an embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub kind: ChunkKind,
    pub text: String,
}

/// Parses source documents and splits pages into chunks
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentExtractor {
    pub fn new(config: &EmbeddingsConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Parse every file in `folder`, in file name order.
    ///
    /// A missing or unreadable folder fails the whole extraction. A file that
    /// cannot be parsed is skipped and recorded in the report.
    pub fn extract(&self, folder: &Path) -> Result<ExtractionReport, ExtractionError> {
        if !folder.is_dir() {
            return Err(ExtractionError::FolderMissing {
                path: folder.display().to_string(),
            });
        }

        let entries = std::fs::read_dir(folder).map_err(|e| ExtractionError::FolderUnreadable {
            path: folder.display().to_string(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ExtractionError::FolderUnreadable {
                path: folder.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_file() && !name.starts_with('.') {
                files.push((name, path));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        info!(folder = %folder.display(), files = files.len(), "Extracting documents");

        let mut report = ExtractionReport::default();
        for (name, path) in files {
            match self.extract_file(&path, &name) {
                Ok(document) => {
                    debug!(file = %name, pages = document.pages.len(), "Document extracted");
                    report.documents.push(document);
                }
                Err(e) => {
                    let reason = format_error_chain(&e);
                    warn!(file = %name, error = %reason, "Skipping document");
                    report.skipped.push(SkippedFile { file: name, reason });
                }
            }
        }

        Ok(report)
    }

    fn extract_file(&self, path: &Path, name: &str) -> Result<SourceDocument, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let pages = match extension.as_str() {
            "pdf" => pdf::extract_pdf(path, name)?,
            "txt" | "text" => split_text_pages(name, &read_text(path, name)?, '\x0c'),
            "md" | "markdown" => vec![Page {
                document_id: name.to_string(),
                index: 0,
                text: read_text(path, name)?,
                images: Vec::new(),
            }],
            _ => {
                return Err(ExtractionError::UnsupportedFormat { format: extension });
            }
        };

        Ok(SourceDocument {
            id: name.to_string(),
            pages,
        })
    }

    /// Turn a page into chunk drafts: word-window text chunks followed by one
    /// description per embedded image.
    ///
    /// Images are skipped when the provider cannot describe them.
    pub async fn page_chunks(
        &self,
        page: &Page,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<ChunkDraft>, ProviderError> {
        let mut drafts: Vec<ChunkDraft> =
            chunk_text(&page.text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .map(|text| ChunkDraft {
                    kind: ChunkKind::Text,
                    text,
                })
                .collect();

        if page.images.is_empty() {
            return Ok(drafts);
        }
        if !provider.describes_images() {
            debug!(
                document = %page.document_id,
                page = page.index,
                images = page.images.len(),
                "Image description unavailable, skipping page images"
            );
            return Ok(drafts);
        }

        for image in &page.images {
            let description = provider.describe_image(image).await?;
            if !description.trim().is_empty() {
                drafts.push(ChunkDraft {
                    kind: ChunkKind::ImageDescription,
                    text: description,
                });
            }
        }

        Ok(drafts)
    }
}

fn read_text(path: &Path, name: &str) -> Result<String, ExtractionError> {
    std::fs::read_to_string(path).map_err(|e| ExtractionError::Read {
        file: name.to_string(),
        source: e,
    })
}

fn split_text_pages(name: &str, text: &str, separator: char) -> Vec<Page> {
    text.split(separator)
        .enumerate()
        .map(|(index, page_text)| Page {
            document_id: name.to_string(),
            index,
            text: page_text.to_string(),
            images: Vec::new(),
        })
        .collect()
}

/// Split text into windows of `chunk_size` words overlapping by `overlap` words.
///
/// Text that fits in one window is returned unchanged (trimmed); blank text yields nothing.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return Vec::new();
    }
    if words.len() <= chunk_size {
        return vec![text.trim().to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Reduce an uploaded file name to a safe final path component
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();

    if sanitized.is_empty() {
        "document".to_string()
    } else {
        sanitized
    }
}

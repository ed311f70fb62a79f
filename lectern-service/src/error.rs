use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No documents have been ingested yet")]
    EmptyCorpus,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("An ingestion run is already in progress")]
    IngestionInProgress,

    #[error("Too many files: {count} (max {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("Ingestion failed during {stage} of {file}{}", .page.map(|p| format!(" page {p}")).unwrap_or_default())]
    Ingestion {
        file: String,
        page: Option<usize>,
        stage: IngestionStage,
        #[source]
        source: Box<ServiceError>,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors from the embedding provider or the generative model
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection failed to provider at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Provider request failed (status {status}): {message}")]
    Request { status: u16, message: String },

    #[error("Invalid response from provider")]
    InvalidResponse {
        #[source]
        source: reqwest::Error,
    },

    #[error("Provider returned an empty embedding")]
    EmptyEmbedding,

    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },
}

/// Document extraction errors
///
/// `FolderMissing` and `FolderUnreadable` abort extraction; the rest are
/// per-file and cause that file to be skipped.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Source folder not found: {path}")]
    FolderMissing { path: String },

    #[error("Source folder could not be read: {path}")]
    FolderUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to read {file}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },
}

/// Stage of an ingestion run, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStage {
    Extraction,
    ImageDescription,
    Embedding,
    Storage,
}

impl std::fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IngestionStage::Extraction => "extraction",
            IngestionStage::ImageDescription => "image description",
            IngestionStage::Embedding => "embedding",
            IngestionStage::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::EmptyCorpus
            | ServiceError::TooManyFiles { .. }
            | ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::IngestionInProgress => StatusCode::CONFLICT,
            ServiceError::DimensionMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Provider(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Extraction(ExtractionError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Ingestion { source, .. } => source.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::EmptyCorpus => "empty_corpus",
            ServiceError::DimensionMismatch { .. } => "dimension_mismatch",
            ServiceError::IngestionInProgress => "ingestion_in_progress",
            ServiceError::TooManyFiles { .. } => "too_many_files",
            ServiceError::Provider(ProviderError::Connection { .. }) => "provider_connection",
            ServiceError::Provider(ProviderError::ModelNotFound { .. }) => {
                "provider_model_not_found"
            }
            ServiceError::Provider(ProviderError::Request { .. }) => "provider_request",
            ServiceError::Provider(ProviderError::InvalidResponse { .. }) => {
                "provider_invalid_response"
            }
            ServiceError::Provider(ProviderError::EmptyEmbedding) => "provider_empty_embedding",
            ServiceError::Provider(ProviderError::Unavailable { .. }) => "provider_unavailable",
            ServiceError::Extraction(ExtractionError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Extraction(_) => "extraction_error",
            ServiceError::Ingestion { .. } => "ingestion_failed",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Io(_) => "io_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// True when the failure originated at the embedding provider or generative model
    pub fn is_provider_failure(&self) -> bool {
        match self {
            ServiceError::Provider(_) => true,
            ServiceError::Ingestion { source, .. } => source.is_provider_failure(),
            _ => false,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: format_error_chain(&self),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and its sources as a single `a: b: c` line
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

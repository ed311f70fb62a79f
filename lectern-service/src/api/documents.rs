//! Document upload and ingestion status endpoints.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt, wrappers::WatchStream};
use tracing::debug;

use crate::error::ServiceError;
use crate::progress::IngestionStatus;
use crate::service::{UploadAccepted, UploadedFile};

use super::AppState;

/// Upload documents and start an ingestion run over them.
///
/// Every `files` (or `file`) field is one document. Replies 202 as soon as
/// the run is started; progress is then available from the status endpoints.
pub async fn upload_documents_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), ServiceError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidRequest {
            message: e.to_string(),
        })?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "files" && name != "file" {
            debug!(field = %name, "Ignoring unknown multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or("document").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidRequest {
                message: e.to_string(),
            })?;

        files.push(UploadedFile {
            filename,
            data: data.to_vec(),
        });
    }

    let accepted = state.service.ingest_uploads(files).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Current ingestion status
pub async fn ingestion_status_handler(State(state): State<Arc<AppState>>) -> Json<IngestionStatus> {
    Json(state.service.progress.snapshot())
}

/// Stream the current ingestion status and every subsequent change as SSE `status` events
pub async fn ingestion_events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = WatchStream::new(state.service.progress.subscribe())
        .map(|status| Event::default().event("status").json_data(status));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::api::tests::{json_body, test_router};
    use crate::progress::IngestionState;

    const BOUNDARY: &str = "lectern-test-boundary";

    fn multipart_request(files: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::post("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_is_accepted_and_status_reaches_completed() {
        let dir = TempDir::new().unwrap();
        let (app, service) = test_router(&dir);

        let response = app
            .clone()
            .oneshot(multipart_request(&[
                ("a.txt", "alpha beta gamma"),
                ("b.md", "delta epsilon"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["files"], serde_json::json!(["a.txt", "b.md"]));

        service
            .progress
            .subscribe()
            .wait_for(|s| s.state == IngestionState::Completed)
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::get("/api/ingestion/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = json_body(response).await;
        assert_eq!(status["in_progress"], false);
        assert_eq!(status["progress"], 100);
        assert_eq!(status["state"], "completed");
        assert_eq!(status["chunks_ingested"], 2);
        assert_eq!(status["current_file"], "b.md");
    }

    #[tokio::test]
    async fn test_too_many_files_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_router(&dir);

        let names: Vec<String> = (0..11).map(|i| format!("doc{i}.txt")).collect();
        let contents: Vec<String> = (0..11).map(|i| format!("content {i}")).collect();
        let files: Vec<(&str, &str)> = names
            .iter()
            .zip(contents.iter())
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();

        let response = app.oneshot(multipart_request(&files)).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "too_many_files");
    }

    #[tokio::test]
    async fn test_events_stream_starts_with_current_status() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_router(&dir);

        let response = app
            .oneshot(
                Request::get("/api/ingestion/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut stream = response.into_body().into_data_stream();
        let first = tokio_stream::StreamExt::next(&mut stream)
            .await
            .unwrap()
            .unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.contains("event: status"));
        assert!(text.contains("\"state\":\"idle\""));
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let dir = TempDir::new().unwrap();
        let (app, _) = test_router(&dir);

        let response = app
            .oneshot(
                Request::get("/api/ingestion/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status["in_progress"], false);
        assert_eq!(status["progress"], 0);
        assert_eq!(status["current_file"], serde_json::Value::Null);
    }
}

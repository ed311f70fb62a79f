//! Question answering endpoint.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::AnswerSource;

use super::AppState;

/// Query request
#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub answer_format: Option<String>,
}

/// Query response
#[derive(Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub context: String,
    pub sources: Vec<AnswerSource>,
}

/// Answer a question from the ingested corpus
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServiceError> {
    let answer = state
        .service
        .query
        .answer(&request.question, request.answer_format.as_deref())
        .await?;

    Ok(Json(QueryResponse {
        answer: answer.answer,
        context: answer.context,
        sources: answer.sources,
    }))
}

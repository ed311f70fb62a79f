//! In-memory corpus of embedded chunks and similarity search over it.
//!
//! The corpus lives for the process lifetime. Chunks are immutable once
//! appended; the only other mutation is [`CorpusStore::clear`], used when a
//! new ingestion run replaces the corpus.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Kind of content a chunk was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    Text,
    ImageDescription,
}

/// A retrievable unit of content paired with its embedding
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: u64,
    pub kind: ChunkKind,
    pub document_id: String,
    pub page_index: usize,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A chunk awaiting insertion; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub kind: ChunkKind,
    pub document_id: String,
    pub page_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A search hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Default)]
struct CorpusInner {
    chunks: Vec<Chunk>,
    dimension: Option<usize>,
    next_id: u64,
}

/// Append-only in-memory chunk table
#[derive(Debug)]
pub struct CorpusStore {
    inner: RwLock<CorpusInner>,
    /// Dimension fixed by configuration; survives `clear`
    fixed_dimension: Option<usize>,
}

impl CorpusStore {
    /// Create an empty corpus. With `dimension` set, every chunk must match it;
    /// otherwise the first appended chunk establishes the dimension.
    pub fn new(dimension: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(CorpusInner {
                dimension,
                ..CorpusInner::default()
            }),
            fixed_dimension: dimension,
        }
    }

    /// Insert a chunk, returning its id
    pub fn append(&self, chunk: NewChunk) -> ServiceResult<u64> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let actual = chunk.embedding.len();
        if actual == 0 {
            return Err(ServiceError::InvalidRequest {
                message: "chunk embedding is empty".to_string(),
            });
        }
        if !is_finite(&chunk.embedding) {
            return Err(ServiceError::InvalidRequest {
                message: "chunk embedding contains NaN or infinite values".to_string(),
            });
        }
        match inner.dimension {
            Some(expected) if expected != actual => {
                return Err(ServiceError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => inner.dimension = Some(actual),
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.chunks.push(Chunk {
            id,
            kind: chunk.kind,
            document_id: chunk.document_id,
            page_index: chunk.page_index,
            text: chunk.text,
            embedding: chunk.embedding,
            created_at: Utc::now(),
        });

        Ok(id)
    }

    /// Rank every chunk by cosine similarity to `query` and return the best `top_n`.
    ///
    /// Ordering is by descending score, ties broken by ascending id.
    pub fn search(&self, query: &[f32], top_n: usize) -> ServiceResult<Vec<ScoredChunk>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        if inner.chunks.is_empty() {
            return Err(ServiceError::EmptyCorpus);
        }
        if let Some(expected) = inner.dimension
            && expected != query.len()
        {
            return Err(ServiceError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
        if !is_finite(query) {
            return Err(ServiceError::InvalidRequest {
                message: "query embedding contains NaN or infinite values".to_string(),
            });
        }

        let mut scored: Vec<(usize, f32)> = inner
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| (index, cosine_similarity(query, &chunk.embedding)))
            .collect();

        // Chunks are stored in id order, so the index is an id tiebreak
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_n);

        debug!(
            candidates = inner.chunks.len(),
            returned = scored.len(),
            "Corpus search completed"
        );

        Ok(scored
            .into_iter()
            .map(|(index, score)| ScoredChunk {
                chunk: inner.chunks[index].clone(),
                score,
            })
            .collect())
    }

    /// Drop every chunk and reset id assignment
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *inner = CorpusInner {
            dimension: self.fixed_dimension,
            ..CorpusInner::default()
        };
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The established embedding dimension, if any
    pub fn dimension(&self) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dimension
    }
}

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|v| v.is_finite())
}

/// Cosine similarity; zero-magnitude vectors score 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

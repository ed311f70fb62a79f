//! Interfaces to the external models the pipelines consume.
//!
//! The Ollama client in [`crate::ollama`] implements both traits; tests use
//! the in-process fakes in [`fakes`].

use async_trait::async_trait;

use crate::error::ProviderError;

/// Produces fixed-length embeddings and textual image descriptions.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a text passage
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Describe an image in a short natural-language passage
    async fn describe_image(&self, image: &[u8]) -> Result<String, ProviderError>;

    /// Whether `describe_image` is available. Images are skipped when it is not.
    fn describes_images(&self) -> bool {
        true
    }
}

/// Single-shot text generation.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Cheap reachability probe for health reporting
    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Deterministic bag-of-words embedder: each word lands in a hashed bucket.
    pub struct HashEmbedder {
        pub dimension: usize,
        pub delay: Option<Duration>,
    }

    impl HashEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                delay: None,
            }
        }

        pub fn with_delay(dimension: usize, delay: Duration) -> Self {
            Self {
                dimension,
                delay: Some(delay),
            }
        }

        pub fn vector(&self, text: &str) -> Vec<f32> {
            let mut vector = vec![0.0; self.dimension];
            for word in text.split_whitespace() {
                let word = word.to_lowercase();
                let bucket = word
                    .bytes()
                    .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                vector[bucket % self.dimension] += 1.0;
            }
            vector
        }
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.vector(text))
        }

        async fn describe_image(&self, image: &[u8]) -> Result<String, ProviderError> {
            Ok(format!("diagram of {} bytes", image.len()))
        }
    }

    /// Embedder with an explicit text → vector table.
    pub struct TableEmbedder {
        pub table: HashMap<String, Vec<f32>>,
        pub fallback: Vec<f32>,
    }

    impl TableEmbedder {
        pub fn new(entries: &[(&str, Vec<f32>)], fallback: Vec<f32>) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(text, vector)| (text.to_string(), vector.clone()))
                    .collect(),
                fallback,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(self
                .table
                .get(text)
                .cloned()
                .unwrap_or_else(|| self.fallback.clone()))
        }

        async fn describe_image(&self, _image: &[u8]) -> Result<String, ProviderError> {
            Ok("an image".to_string())
        }

        fn describes_images(&self) -> bool {
            false
        }
    }

    /// Succeeds for the first `succeed_for` embeddings, then reports the provider as down.
    pub struct FailingEmbedder {
        pub inner: HashEmbedder,
        pub succeed_for: usize,
        calls: AtomicUsize,
    }

    impl FailingEmbedder {
        pub fn new(dimension: usize, succeed_for: usize) -> Self {
            Self {
                inner: HashEmbedder::new(dimension),
                succeed_for,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.succeed_for {
                return Err(ProviderError::Unavailable {
                    message: "embedding model offline".to_string(),
                });
            }
            self.inner.embed_text(text).await
        }

        async fn describe_image(&self, image: &[u8]) -> Result<String, ProviderError> {
            self.inner.describe_image(image).await
        }
    }

    /// Embeds text normally but the vision model is down.
    pub struct FailingDescriber {
        pub inner: HashEmbedder,
    }

    impl FailingDescriber {
        pub fn new(dimension: usize) -> Self {
            Self {
                inner: HashEmbedder::new(dimension),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FailingDescriber {
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.inner.embed_text(text).await
        }

        async fn describe_image(&self, _image: &[u8]) -> Result<String, ProviderError> {
            Err(ProviderError::ModelNotFound {
                model: "llava".to_string(),
            })
        }
    }

    /// Generator that records every prompt and answers with a fixed reply.
    pub struct RecordingGenerator {
        pub reply: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeModel for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    pub struct FailingGenerator;

    #[async_trait]
    impl GenerativeModel for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Request {
                status: 500,
                message: "model crashed".to_string(),
            })
        }
    }
}

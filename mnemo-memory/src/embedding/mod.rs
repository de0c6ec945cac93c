//! Embedding module for semantic search
//!
//! The indexer and the ranking engine only see [`EmbeddingGateway`]; the
//! production gateway is [`VectorEngine`] (fastembed, BGE-small-en-v1.5).

mod discovery;
mod engine;

pub use discovery::find_model_cache_dir;
pub use engine::VectorEngine;

use async_trait::async_trait;

use crate::error::Result;

/// Text to fixed-length vector.
///
/// Implementations must be deterministic for identical input, otherwise
/// re-indexing unchanged content would not be a no-op.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts in one call; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector length produced by this gateway
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

//! Vector embedding engine
//!
//! fastembed model behind a DashMap cache, exposed as an [`EmbeddingGateway`].

use super::discovery::find_model_cache_dir;
use super::EmbeddingGateway;
use crate::error::{MemoryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::Arc;

/// Vector embedding engine with caching
///
/// Wraps a fastembed model with a DashMap cache for efficient repeated lookups.
/// Inference runs on the blocking pool so async callers are not stalled.
pub struct VectorEngine {
    model: Arc<TextEmbedding>,
    cache: DashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VectorEngine {
    /// Load BGE-small-en-v1.5, downloading it into the model cache if needed
    ///
    /// # Arguments
    /// * `models_dir` - Optional configured model cache directory
    pub fn new(models_dir: Option<&Path>) -> Result<Self> {
        let cache_dir = find_model_cache_dir(models_dir)?;

        let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| MemoryError::model(format!("Failed to load embedding model: {}", e)))?;

        // Get dimension by encoding test string
        let sample = model
            .embed(vec!["test"], None)
            .map_err(|e| MemoryError::model(format!("Failed to encode test string: {}", e)))?;
        let dimension = sample.first().map(Vec::len).unwrap_or_default();

        log::info!("VectorEngine ready ({}d)", dimension);

        Ok(Self {
            model: Arc::new(model),
            cache: DashMap::new(),
            dimension,
        })
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| MemoryError::embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| MemoryError::embedding(format!("Failed to encode texts: {}", e)))
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl EmbeddingGateway for VectorEngine {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self
            .encode(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::embedding("Model returned no embedding"))?;
        self.cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cache.get(text).map(|v| v.clone()))
            .collect();

        let uncached: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| i)
            .collect();

        if !uncached.is_empty() {
            let batch: Vec<String> = uncached.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.encode(batch).await?;
            if fresh.len() != uncached.len() {
                return Err(MemoryError::embedding(format!(
                    "Model returned {} embeddings for {} texts",
                    fresh.len(),
                    uncached.len()
                )));
            }

            for (idx, emb) in uncached.into_iter().zip(fresh) {
                self.cache.insert(texts[idx].clone(), emb.clone());
                results[idx] = Some(emb);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

//! Memory engine access for the host
//!
//! Opening an engine loads the embedding model and the on-disk store, so
//! the host keeps one engine alive and hands out shared references to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub use mnemo_memory::{MemoryConfig, MemoryEngine, MemoryError};

type EngineFactory = Box<dyn Fn(MemoryConfig) -> Result<MemoryEngine, MemoryError> + Send + Sync>;

/// Memoized accessor for the memory engine
///
/// The engine is keyed by its data directory. Asking for a different
/// directory drops the current engine and opens a new one.
pub struct MemoryManager {
    current: Arc<RwLock<Option<(PathBuf, Arc<MemoryEngine>)>>>,
    factory: EngineFactory,
}

impl MemoryManager {
    /// Manager that opens engines from disk with the bundled embedding model
    pub fn new() -> Self {
        Self::with_factory(MemoryEngine::open)
    }

    /// Manager with a custom way of opening engines
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(MemoryConfig) -> Result<MemoryEngine, MemoryError> + Send + Sync + 'static,
    {
        Self {
            current: Arc::new(RwLock::new(None)),
            factory: Box::new(factory),
        }
    }

    /// Engine for `config`, opening it on first use
    ///
    /// # Errors
    /// Returns error if the data directory, model or store cannot be opened.
    pub async fn engine(&self, config: &MemoryConfig) -> Result<Arc<MemoryEngine>, MemoryError> {
        let key = resolve(&config.data_dir);

        if let Some((dir, engine)) = self.current.read().await.as_ref() {
            if *dir == key {
                return Ok(Arc::clone(engine));
            }
        }

        let mut current = self.current.write().await;
        if let Some((dir, engine)) = current.as_ref() {
            if *dir == key {
                return Ok(Arc::clone(engine));
            }
            tracing::info!(
                "Switching memory engine from {} to {}",
                dir.display(),
                key.display()
            );
        }

        let engine = Arc::new((self.factory)(config.clone()).map_err(|e| {
            tracing::error!("Failed to open memory engine at {}: {}", key.display(), e);
            e
        })?);
        tracing::info!("Memory engine opened at {}", key.display());

        *current = Some((key, Arc::clone(&engine)));
        Ok(engine)
    }

    /// Check if an engine is open
    pub async fn is_initialized(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Data directory of the open engine, if any
    pub async fn data_dir(&self) -> Option<PathBuf> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|(dir, _)| dir.clone())
    }

    /// Drop the open engine
    pub async fn close(&self) {
        *self.current.write().await = None;
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical form of a data directory, falling back to the path as given
/// when it does not exist yet
fn resolve(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

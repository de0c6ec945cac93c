//! Model cache discovery
//!
//! Finds (or creates) the directory fastembed downloads its model into.

use crate::error::{MemoryError, Result};
use std::path::{Path, PathBuf};

/// Resolve the model cache directory with priority:
/// 1. MNEMO_MODELS_PATH environment variable
/// 2. The configured models directory
///
/// The directory is created if it does not exist yet.
pub fn find_model_cache_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Ok(models_path) = std::env::var("MNEMO_MODELS_PATH") {
        let path = PathBuf::from(&models_path);
        if path.is_dir() {
            log::info!("Using MNEMO_MODELS_PATH: {}", path.display());
            return Ok(path);
        }
        log::warn!("MNEMO_MODELS_PATH set but not a directory: {}", models_path);
    }

    let dir = configured.ok_or_else(|| {
        MemoryError::model(
            "No model cache directory. Set MNEMO_MODELS_PATH or configure a memory root.",
        )
    })?;

    std::fs::create_dir_all(dir).map_err(|e| {
        MemoryError::invalid_path(format!(
            "Cannot create model cache {}: {}",
            dir.display(),
            e
        ))
    })?;
    Ok(dir.to_path_buf())
}

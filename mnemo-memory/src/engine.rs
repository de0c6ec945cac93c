//! Memory engine
//!
//! The explicit context object for one memory store: configuration, the
//! embedding gateway, the vector store, the indexer and the query side,
//! constructed once and shared by every hosted operation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MemoryConfig;
use crate::embedding::{EmbeddingGateway, VectorEngine};
use crate::error::Result;
use crate::indexer::{IndexReport, Indexer, RebuildReport};
use crate::search::{
    ConversationSearchOptions, ExchangeResult, MemorySearch, SearchOptions, SearchOutcome,
    SearchResult,
};
use crate::storage::{RocksVectorStore, VectorStore};

/// Summary of what the index holds
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Vectors in the store, including stale ones from deleted sources
    pub stored_items: usize,
    pub by_type: BTreeMap<String, usize>,
    /// Items derived from currently tracked sources
    pub indexed_items: usize,
    pub tracked_sources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// One local memory store and every operation on it
pub struct MemoryEngine {
    config: MemoryConfig,
    store: Arc<dyn VectorStore>,
    indexer: Indexer,
    search: MemorySearch,
}

impl MemoryEngine {
    /// Assemble an engine from explicit collaborators
    pub fn new(
        config: MemoryConfig,
        gateway: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let config = config.normalized();
        let search = MemorySearch::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            config.effective_oversample(),
        );
        let indexer = Indexer::new(config.clone(), gateway, Arc::clone(&store));

        Self {
            config,
            store,
            indexer,
            search,
        }
    }

    /// Open the on-disk store and load the embedding model
    pub fn open(config: MemoryConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let models_dir = config.models_dir();
        let gateway = VectorEngine::new(Some(&models_dir))?;
        let store = RocksVectorStore::open(config.store_path())?;

        log::info!("Memory engine ready at {}", config.data_dir.display());
        Ok(Self::new(config, Arc::new(gateway), Arc::new(store)))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Directory the engine's durable state lives in
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Ranked search across every kind of memory
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchOutcome<SearchResult>> {
        self.search.search(query, options).await
    }

    /// Ranked search across conversation exchanges
    pub async fn search_conversations(
        &self,
        query: &str,
        options: &ConversationSearchOptions,
    ) -> Result<SearchOutcome<ExchangeResult>> {
        self.search.search_conversations(query, options).await
    }

    /// Reprocess every source from scratch
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        self.indexer.rebuild().await
    }

    /// Reprocess changed and new sources only
    pub async fn update_index(&self) -> Result<IndexReport> {
        self.indexer.update().await
    }

    /// Incremental update of one source
    pub async fn index_single_source(&self, path: &Path) -> Result<IndexReport> {
        self.indexer.index_sources(&[path.to_path_buf()]).await
    }

    /// Incremental update of a set of sources in one pass
    pub async fn index_sources(&self, paths: &[PathBuf]) -> Result<IndexReport> {
        self.indexer.index_sources(paths).await
    }

    /// Whether an index pass is currently running
    pub fn is_indexing(&self) -> bool {
        self.indexer.is_busy()
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        let items = self.store.list_items().await?;
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for item in &items {
            let kind = item
                .metadata
                .get("type")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            *by_type.entry(kind).or_insert(0) += 1;
        }

        let state = match self.indexer.snapshot() {
            Some(state) => Some(state),
            None => crate::state::IndexState::load(&self.config.state_path())?,
        };

        Ok(MemoryStats {
            stored_items: items.len(),
            by_type,
            indexed_items: state.as_ref().map(|s| s.item_count()).unwrap_or(0),
            tracked_sources: state.as_ref().map(|s| s.source_count()).unwrap_or(0),
            last_update: state.and_then(|s| s.last_update),
        })
    }
}

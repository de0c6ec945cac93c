//! Mnemo Memory Layer
//!
//! Personal memory for an AI agent: journal notes, entity documents and
//! conversation transcripts, indexed incrementally and searched with
//! recency and context aware ranking.
//!
//! ## Features
//!
//! - **Exchange extraction** - Clean user/assistant pairs out of noisy transcript logs
//! - **Incremental indexing** - Unchanged sources are never reparsed or re-embedded
//! - **Reranked retrieval** - Similarity weighted by age bucket and project context
//! - **RocksDB persistence** - Vectors on disk with an HNSW index for large stores
//!
//! ## Example
//!
//! ```ignore
//! use mnemo_memory::{MemoryConfig, MemoryEngine, SearchOptions};
//!
//! let engine = MemoryEngine::open(MemoryConfig::from_env())?;
//! engine.update_index().await?;
//!
//! let outcome = engine.search("why did the deploy fail", &SearchOptions::default()).await?;
//! for hit in outcome.results {
//!     println!("{:.3} {}", hit.adjusted_score, hit.item.content);
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod item;
pub mod search;
pub mod sources;
pub mod state;
pub mod storage;
pub mod temporal;

// Re-exports for convenience
pub use config::MemoryConfig;
pub use embedding::{EmbeddingGateway, VectorEngine};
pub use engine::{MemoryEngine, MemoryStats};
pub use error::MemoryError;
pub use indexer::{IndexReport, Indexer, RebuildReport};
pub use item::{ConversationExchange, ItemKind, ItemMetadata, MemoryId, MemoryItem};
pub use search::{
    ConversationSearchOptions, ExchangeResult, MemorySearch, SearchOptions, SearchOutcome,
    SearchResult,
};
pub use sources::{Fingerprint, SourceKind};
pub use state::IndexState;
pub use storage::{MemoryVectorStore, QueryHit, RocksVectorStore, StoredItem, VectorStore};

//! Vector store collaborators
//!
//! [`VectorStore`] is the contract the indexer and ranking engine rely on.
//! [`RocksVectorStore`] persists items in RocksDB with LZ4 compression and
//! answers queries through an instant-distance HNSW index (exact scan for
//! small stores). [`MemoryVectorStore`] keeps everything in process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::error::Result;

/// Schema version written by `create_index`
const SCHEMA_VERSION_KEY: &[u8] = b"_schema_version";
const SCHEMA_VERSION: u32 = 1;

const ITEM_PREFIX: &str = "item:";

/// Below this many items an exact scan is cheaper than HNSW
const LINEAR_SCAN_LIMIT: usize = 2048;

/// HNSW search beam; requests for more neighbours fall back to an exact scan
const EF_SEARCH: usize = 100;

/// An item as the vector store sees it: id, vector and a flat string map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

/// A nearest-neighbour hit; higher score means more similar
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub item: StoredItem,
    pub score: f32,
}

/// Persisted nearest-neighbour index
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Make sure the index exists and is usable
    async fn create_index(&self) -> Result<()>;

    /// Whether `create_index` has run against this store
    async fn is_index_created(&self) -> Result<bool>;

    /// Insert or overwrite by id
    async fn upsert_item(&self, item: StoredItem) -> Result<()>;

    /// Insert or overwrite many items
    async fn upsert_items(&self, items: Vec<StoredItem>) -> Result<()> {
        for item in items {
            self.upsert_item(item).await?;
        }
        Ok(())
    }

    /// The `k` nearest items to `vector`, best first
    async fn query_items(&self, vector: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    /// Every stored item
    async fn list_items(&self) -> Result<Vec<StoredItem>>;

    /// Remove items by id; returns how many existed
    async fn delete_items(&self, ids: &[String]) -> Result<usize>;
}

/// HNSW point wrapper for semantic search
#[derive(Clone)]
struct ItemPoint {
    vector: Vec<f32>,
}

impl Point for ItemPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1 - similarity (HNSW finds minimum)
        1.0 - cosine_similarity(&self.vector, &other.vector)
    }
}

/// RocksDB-based vector store with HNSW indexing
pub struct RocksVectorStore {
    db: Arc<DB>,
    items: Arc<DashMap<String, StoredItem>>,
    hnsw: Arc<RwLock<Option<HnswMap<ItemPoint, String>>>>,
    dirty: AtomicBool,
}

impl RocksVectorStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;

        log::info!("Vector store opened at: {}", path.display());

        let store = Self {
            db: Arc::new(db),
            items: Arc::new(DashMap::new()),
            hnsw: Arc::new(RwLock::new(None)),
            dirty: AtomicBool::new(true),
        };

        store.load_cache()?;
        Ok(store)
    }

    /// Load existing items into cache on startup
    fn load_cache(&self) -> Result<()> {
        let mut count = 0;
        let mut skipped = 0;

        for entry in self.db.iterator(IteratorMode::Start) {
            let (key, value) = entry?;
            let key_str = String::from_utf8_lossy(&key);
            let Some(id) = key_str.strip_prefix(ITEM_PREFIX) else {
                continue;
            };

            // Gracefully handle deserialization errors
            match bincode::deserialize::<StoredItem>(&value) {
                Ok(item) => {
                    self.items.insert(id.to_string(), item);
                    count += 1;
                }
                Err(e) => {
                    log::warn!("Failed to deserialize item {}: {}. Skipping.", id, e);
                    skipped += 1;
                }
            }
        }

        if count > 0 {
            log::info!("Loaded {} vectors from disk", count);
        }
        if skipped > 0 {
            log::warn!("Skipped {} vectors due to deserialization errors", skipped);
        }
        Ok(())
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        Ok(self.db.get(SCHEMA_VERSION_KEY)?.and_then(|bytes| {
            let raw: [u8; 4] = bytes.as_slice().try_into().ok()?;
            Some(u32::from_le_bytes(raw))
        }))
    }

    /// Rebuild the HNSW graph if items changed since the last query
    fn ensure_hnsw(&self) {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return;
        }

        let (points, ids): (Vec<ItemPoint>, Vec<String>) = self
            .items
            .iter()
            .map(|entry| {
                (
                    ItemPoint {
                        vector: entry.value().vector.clone(),
                    },
                    entry.key().clone(),
                )
            })
            .unzip();

        let index = if points.len() > LINEAR_SCAN_LIMIT {
            Some(
                Builder::default()
                    .ef_construction(100)
                    .ef_search(EF_SEARCH)
                    .build(points, ids),
            )
        } else {
            None
        };
        *self.hnsw.write() = index;
    }

    fn hnsw_search(&self, vector: &[f32], k: usize) -> Option<Vec<(String, f32)>> {
        if k > EF_SEARCH {
            return None;
        }
        self.ensure_hnsw();

        let guard = self.hnsw.read();
        let index = guard.as_ref()?;
        let query = ItemPoint {
            vector: vector.to_vec(),
        };
        let mut search = Search::default();

        Some(
            index
                .search(&query, &mut search)
                .take(k)
                .map(|hit| (hit.value.clone(), 1.0 - hit.distance))
                .collect(),
        )
    }
}

#[async_trait]
impl VectorStore for RocksVectorStore {
    async fn create_index(&self) -> Result<()> {
        if self.schema_version()? != Some(SCHEMA_VERSION) {
            self.db
                .put(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_le_bytes())?;
            self.db.flush()?;
        }
        Ok(())
    }

    async fn is_index_created(&self) -> Result<bool> {
        Ok(self.schema_version()? == Some(SCHEMA_VERSION))
    }

    async fn upsert_item(&self, item: StoredItem) -> Result<()> {
        self.upsert_items(vec![item]).await
    }

    async fn upsert_items(&self, items: Vec<StoredItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for item in &items {
            let key = format!("{}{}", ITEM_PREFIX, item.id);
            batch.put(key.as_bytes(), bincode::serialize(item)?);
        }
        self.db.write(batch)?;
        self.db.flush()?;

        for item in items {
            self.items.insert(item.id.clone(), item);
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn query_items(&self, vector: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let ranked = match self.hnsw_search(vector, k) {
            Some(ranked) => ranked,
            None => linear_search(&self.items, vector, k),
        };

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                self.items.get(&id).map(|item| QueryHit {
                    item: item.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn list_items(&self) -> Result<Vec<StoredItem>> {
        Ok(self.items.iter().map(|e| e.value().clone()).collect())
    }

    async fn delete_items(&self, ids: &[String]) -> Result<usize> {
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for id in ids {
            if self.items.remove(id).is_some() {
                removed += 1;
            }
            batch.delete(format!("{}{}", ITEM_PREFIX, id).as_bytes());
        }
        self.db.write(batch)?;
        self.db.flush()?;
        self.dirty.store(true, Ordering::Release);
        Ok(removed)
    }
}

/// In-process vector store with exact search
#[derive(Default)]
pub struct MemoryVectorStore {
    items: DashMap<String, StoredItem>,
    created: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_index(&self) -> Result<()> {
        self.created.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_index_created(&self) -> Result<bool> {
        Ok(self.created.load(Ordering::Acquire))
    }

    async fn upsert_item(&self, item: StoredItem) -> Result<()> {
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn query_items(&self, vector: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        Ok(linear_search(&self.items, vector, k)
            .into_iter()
            .filter_map(|(id, score)| {
                self.items.get(&id).map(|item| QueryHit {
                    item: item.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn list_items(&self) -> Result<Vec<StoredItem>> {
        Ok(self.items.iter().map(|e| e.value().clone()).collect())
    }

    async fn delete_items(&self, ids: &[String]) -> Result<usize> {
        Ok(ids
            .iter()
            .filter(|id| self.items.remove(*id).is_some())
            .count())
    }
}

/// Exact scan over every cached vector
fn linear_search(
    items: &DashMap<String, StoredItem>,
    vector: &[f32],
    limit: usize,
) -> Vec<(String, f32)> {
    let mut results: Vec<(String, f32)> = items
        .iter()
        .map(|entry| {
            let similarity = cosine_similarity(vector, &entry.value().vector);
            (entry.key().clone(), similarity)
        })
        .collect();

    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(id: &str, vector: Vec<f32>) -> StoredItem {
        let mut metadata = BTreeMap::new();
        metadata.insert("type".to_string(), "journal".to_string());
        StoredItem {
            id: id.to_string(),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_memory_store_query_order() {
        let store = MemoryVectorStore::new();
        store.create_index().await.unwrap();
        store.upsert_item(item("a", vec![1.0, 0.0])).await.unwrap();
        store.upsert_item(item("b", vec![0.7, 0.7])).await.unwrap();
        store.upsert_item(item("c", vec![0.0, 1.0])).await.unwrap();

        let hits = store.query_items(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_memory_store_upsert_overwrites() {
        let store = MemoryVectorStore::new();
        store.upsert_item(item("a", vec![1.0, 0.0])).await.unwrap();
        store.upsert_item(item("a", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.len(), 1);
        let listed = store.list_items().await.unwrap();
        assert_eq!(listed[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_rocks_store_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = RocksVectorStore::open(temp.path()).unwrap();
            assert!(!store.is_index_created().await.unwrap());
            store.create_index().await.unwrap();
            store
                .upsert_items(vec![item("a", vec![1.0, 0.0]), item("b", vec![0.0, 1.0])])
                .await
                .unwrap();
        }

        let store = RocksVectorStore::open(temp.path()).unwrap();
        assert!(store.is_index_created().await.unwrap());
        assert_eq!(store.list_items().await.unwrap().len(), 2);

        let hits = store.query_items(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].item.id, "b");
        assert!((hits[0].score - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_rocks_store_delete() {
        let temp = TempDir::new().unwrap();
        let store = RocksVectorStore::open(temp.path()).unwrap();
        store.create_index().await.unwrap();
        store.upsert_item(item("a", vec![1.0, 0.0])).await.unwrap();

        let removed = store
            .delete_items(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.query_items(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocks_store_hnsw_path() {
        let temp = TempDir::new().unwrap();
        let store = RocksVectorStore::open(temp.path()).unwrap();
        store.create_index().await.unwrap();

        let items: Vec<StoredItem> = (0..LINEAR_SCAN_LIMIT + 10)
            .map(|i| {
                let angle = i as f32 * 0.001;
                item(&format!("p{}", i), vec![angle.cos(), angle.sin(), 0.0])
            })
            .collect();
        store.upsert_items(items).await.unwrap();

        let angle = 500.0_f32 * 0.001;
        let hits = store
            .query_items(&[angle.cos(), angle.sin(), 0.0], 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score > 0.999);
        assert!(hits[0].score >= hits[2].score);
    }
}

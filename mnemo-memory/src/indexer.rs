//! Incremental index maintenance
//!
//! Sources whose fingerprint matches the stored one are skipped entirely:
//! no parsing, no embedding calls. Changed and new sources are reparsed,
//! embedded in batches and upserted. Every pass works on a copy of the
//! index state and swaps it in only after the pass succeeds, so a failing
//! collaborator leaves the previous (stale, not corrupt) state in place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::{MemoryError, Result};
use crate::item::MemoryItem;
use crate::sources::{self, DiscoveredSource, Fingerprint};
use crate::state::{IndexState, SourceEntry};
use crate::storage::{StoredItem, VectorStore};

/// Outcome of an incremental pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Items derived from all tracked sources after the pass
    pub item_count: usize,
    /// Sources reparsed and re-embedded
    pub files_updated: usize,
    /// Sources left alone because they were unchanged
    pub skipped: usize,
    /// Sources dropped from bookkeeping because they disappeared
    #[serde(skip_serializing_if = "is_zero")]
    pub removed: usize,
}

/// Outcome of a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub item_count: usize,
    /// Orphaned vectors deleted from the store
    #[serde(skip_serializing_if = "is_zero")]
    pub pruned: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Resets the in-progress flag when a pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builds and maintains the vector index from the configured sources
pub struct Indexer {
    config: MemoryConfig,
    gateway: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    state: RwLock<Option<IndexState>>,
    in_progress: AtomicBool,
}

impl Indexer {
    pub fn new(
        config: MemoryConfig,
        gateway: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config: config.normalized(),
            gateway,
            store,
            state: RwLock::new(None),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Bring the index up to date with the sources on disk.
    ///
    /// Without usable persisted state (or an index) this is a full rebuild.
    pub async fn update(&self) -> Result<IndexReport> {
        let _guard = self.begin_pass()?;

        let Some(base) = self.usable_state().await? else {
            log::info!("No usable index state, rebuilding from scratch");
            return self.rebuild_locked().await.map(|(report, files)| IndexReport {
                item_count: report.item_count,
                files_updated: files,
                skipped: 0,
                removed: 0,
            });
        };

        let mut next = base;
        let discovered = sources::discover(&self.config);
        let present: Vec<PathBuf> = discovered.iter().map(|s| s.path.clone()).collect();
        let gone = next.retain_present(&present);
        for path in &gone {
            log::debug!("Source disappeared: {}", path.display());
        }

        let mut report = IndexReport {
            removed: gone.len(),
            ..Default::default()
        };

        for source in &discovered {
            self.refresh_source(source, &mut next, &mut report).await?;
        }

        report.item_count = next.item_count();
        self.commit(next)?;

        log::info!(
            "Index update: {} items, {} files updated, {} skipped",
            report.item_count,
            report.files_updated,
            report.skipped
        );
        Ok(report)
    }

    /// Reprocess every source from empty state
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _guard = self.begin_pass()?;
        self.rebuild_locked().await.map(|(report, _)| report)
    }

    /// Targeted update for specific paths (file-watch callbacks).
    ///
    /// Paths are normalized before matching, so relative or symlinked
    /// spellings of a tracked source hit the same entry. Paths outside the
    /// configured source roots are ignored; paths that no longer exist are
    /// dropped from bookkeeping.
    pub async fn index_sources(&self, paths: &[PathBuf]) -> Result<IndexReport> {
        let _guard = self.begin_pass()?;

        let Some(mut next) = self.usable_state().await? else {
            return self.rebuild_locked().await.map(|(report, files)| IndexReport {
                item_count: report.item_count,
                files_updated: files,
                skipped: 0,
                removed: 0,
            });
        };

        let mut report = IndexReport::default();
        let mut seen = HashSet::new();

        for path in paths {
            let path = &sources::normalize_path(path);
            if !seen.insert(path.clone()) {
                continue;
            }
            let Some(kind) = sources::classify(path, &self.config) else {
                log::debug!("Not a memory source: {}", path.display());
                continue;
            };

            if !path.exists() {
                if next.forget(path).is_some() {
                    report.removed += 1;
                }
                continue;
            }

            let source = DiscoveredSource {
                path: path.clone(),
                kind,
            };
            self.refresh_source(&source, &mut next, &mut report).await?;
        }

        report.item_count = next.item_count();
        self.commit(next)?;
        Ok(report)
    }

    /// Current committed state, if any
    pub fn snapshot(&self) -> Option<IndexState> {
        self.state.read().clone()
    }

    /// Whether a pass is running right now
    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    fn begin_pass(&self) -> Result<PassGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MemoryError::IndexBusy)?;
        Ok(PassGuard(&self.in_progress))
    }

    /// State to build on: the committed copy, else whatever is on disk.
    /// `None` when there is no state or the store has no index.
    async fn usable_state(&self) -> Result<Option<IndexState>> {
        if !self.store.is_index_created().await? {
            return Ok(None);
        }
        let committed = self.state.read().clone();
        match committed {
            Some(state) => Ok(Some(state)),
            None => IndexState::load(&self.config.state_path()),
        }
    }

    async fn rebuild_locked(&self) -> Result<(RebuildReport, usize)> {
        self.store.create_index().await?;

        let mut next = IndexState::new();
        let mut report = IndexReport::default();
        for source in sources::discover(&self.config) {
            self.refresh_source(&source, &mut next, &mut report).await?;
        }

        let keep: HashSet<String> = next
            .sources
            .values()
            .flat_map(|entry| entry.item_ids.iter().map(|id| id.to_string()))
            .collect();
        let orphans: Vec<String> = self
            .store
            .list_items()
            .await?
            .into_iter()
            .map(|item| item.id)
            .filter(|id| !keep.contains(id))
            .collect();
        let pruned = if orphans.is_empty() {
            0
        } else {
            self.store.delete_items(&orphans).await?
        };

        let item_count = next.item_count();
        self.commit(next)?;

        log::info!(
            "Index rebuilt: {} items from {} files, {} orphaned vectors pruned",
            item_count,
            report.files_updated,
            pruned
        );
        Ok((RebuildReport { item_count, pruned }, report.files_updated))
    }

    /// Reindex one source into `state` unless its fingerprint is unchanged.
    ///
    /// Parse failures skip the source and keep its previous entry;
    /// collaborator failures abort the pass.
    async fn refresh_source(
        &self,
        source: &DiscoveredSource,
        state: &mut IndexState,
        report: &mut IndexReport,
    ) -> Result<()> {
        let fingerprint = match Fingerprint::of(&source.path) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                log::warn!("Cannot stat {}: {}", source.path.display(), e);
                return Ok(());
            }
        };

        if state.is_fresh(&source.path, &fingerprint) {
            report.skipped += 1;
            return Ok(());
        }

        match self.index_file(source, fingerprint).await {
            Ok(entry) => {
                log::debug!(
                    "Indexed {} ({} items)",
                    source.path.display(),
                    entry.item_ids.len()
                );
                state.record(source.path.clone(), entry);
                report.files_updated += 1;
                Ok(())
            }
            Err(e) if e.is_collaborator_failure() => Err(e),
            Err(e) => {
                log::warn!("Skipping {}: {}", source.path.display(), e);
                Ok(())
            }
        }
    }

    async fn index_file(
        &self,
        source: &DiscoveredSource,
        fingerprint: Fingerprint,
    ) -> Result<SourceEntry> {
        let items = sources::read_source(source.kind, &source.path, &self.config)?;
        self.embed_and_store(&source.path, &items).await?;

        Ok(SourceEntry {
            kind: source.kind,
            fingerprint,
            item_ids: items.iter().map(|item| item.id).collect(),
        })
    }

    async fn embed_and_store(&self, path: &Path, items: &[MemoryItem]) -> Result<()> {
        let batch_size = self.config.embed_batch_size.max(1);

        for chunk in items.chunks(batch_size) {
            let texts: Vec<String> = chunk.iter().map(|item| item.content.clone()).collect();
            let vectors = self.gateway.embed_batch(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(MemoryError::unavailable(format!(
                    "embedding gateway returned {} vectors for {} texts from {}",
                    vectors.len(),
                    chunk.len(),
                    path.display()
                )));
            }

            let mut stored = Vec::with_capacity(chunk.len());
            for (item, vector) in chunk.iter().zip(vectors) {
                stored.push(StoredItem {
                    id: item.id.to_string(),
                    vector,
                    metadata: item.to_fields()?,
                });
            }
            self.store.upsert_items(stored).await?;
        }
        Ok(())
    }

    /// Persist and publish a finished pass
    fn commit(&self, mut next: IndexState) -> Result<()> {
        next.touch(Utc::now());
        next.save(&self.config.state_path())?;
        *self.state.write() = Some(next);
        Ok(())
    }
}

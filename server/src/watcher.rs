//! File system watcher for incremental memory updates.
//!
//! Source changes are coalesced: every path reported while events keep
//! arriving is collected, and once the channel has been quiet for the
//! debounce window the whole set is indexed in a single pass.

use crate::error::ServerResult;
use globset::{Glob, GlobSet, GlobSetBuilder};
use mnemo_memory::MemoryEngine;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// File names the memory sources use
const SOURCE_PATTERNS: &[&str] = &["*.jsonl", "*.md"];

/// Capacity of the event channel between notify and the debouncer.
const EVENT_BUFFER: usize = 256;

/// Decides which changed paths are worth indexing.
pub struct SourceFilter {
    globs: GlobSet,
}

impl SourceFilter {
    pub fn new() -> ServerResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in SOURCE_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            globs: builder.build()?,
        })
    }

    /// True for non-hidden journal, transcript and entity files
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if name.to_string_lossy().starts_with('.') {
            return false;
        }
        self.globs.is_match(name)
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Spawn the task that turns a stream of changed paths into index passes.
///
/// `on_batch` is called once per quiet period with the union of the paths
/// seen since the previous call. When the channel closes, anything still
/// pending is flushed before the task ends.
pub fn spawn_debouncer<F, Fut>(
    mut rx: mpsc::Receiver<PathBuf>,
    window: Duration,
    on_batch: F,
) -> JoinHandle<()>
where
    F: Fn(Vec<PathBuf>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut pending = BTreeSet::from([first]);
            let mut closed = false;

            loop {
                match tokio::time::timeout(window, rx.recv()).await {
                    Ok(Some(path)) => {
                        pending.insert(path);
                    }
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            tracing::debug!("Debounce window closed with {} paths", pending.len());
            on_batch(pending.into_iter().collect()).await;

            if closed {
                break;
            }
        }
    })
}

/// Watches the memory source directories and keeps the index current.
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    debouncer: JoinHandle<()>,
}

impl SourceWatcher {
    /// Start watching the engine's source roots.
    ///
    /// Missing source directories are created so they can be watched.
    pub fn start(engine: Arc<MemoryEngine>) -> ServerResult<Self> {
        let config = engine.config().clone();
        let filter = SourceFilter::new()?;
        let (tx, rx) = mpsc::channel::<PathBuf>(EVENT_BUFFER);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_relevant(&event.kind) => {
                    for path in event.paths {
                        if filter.matches(&path) {
                            // Called from notify's own thread, outside the runtime
                            let _ = tx.blocking_send(path);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            Config::default(),
        )?;

        let roots = [
            (&config.journal_dir, RecursiveMode::NonRecursive),
            (&config.entities_dir, RecursiveMode::NonRecursive),
            (&config.transcripts_dir, RecursiveMode::Recursive),
        ];
        for (dir, mode) in roots {
            std::fs::create_dir_all(dir)?;
            watcher.watch(dir, mode)?;
            tracing::info!("Watching {}", dir.display());
        }

        let debouncer = spawn_debouncer(rx, config.debounce, move |paths| {
            let engine = Arc::clone(&engine);
            async move {
                match engine.index_sources(&paths).await {
                    Ok(report) => tracing::info!(
                        "Reindexed {} of {} changed sources ({} items)",
                        report.files_updated,
                        paths.len(),
                        report.item_count
                    ),
                    Err(e) => tracing::warn!("Incremental update failed: {}", e),
                }
            }
        });

        Ok(Self { watcher, debouncer })
    }

    /// Stop watching and wait for any pending pass to finish.
    pub async fn stop(self) {
        let Self { watcher, debouncer } = self;
        drop(watcher);
        let _ = debouncer.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Batches = Arc<Mutex<Vec<Vec<PathBuf>>>>;

    fn recording_debouncer(window: Duration) -> (mpsc::Sender<PathBuf>, Batches, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let batches: Batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let handle = spawn_debouncer(rx, window, move |paths| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(paths);
            }
        });
        (tx, batches, handle)
    }

    #[test]
    fn test_filter_accepts_source_files() {
        let filter = SourceFilter::new().unwrap();
        assert!(filter.matches(Path::new("/m/journal/2026-10-01.jsonl")));
        assert!(filter.matches(Path::new("/m/entities/alice.md")));
        assert!(filter.matches(Path::new("/m/transcripts/api/s1.jsonl")));
    }

    #[test]
    fn test_filter_rejects_other_files() {
        let filter = SourceFilter::new().unwrap();
        assert!(!filter.matches(Path::new("/m/journal/notes.txt")));
        assert!(!filter.matches(Path::new("/m/entities/.alice.md.swp")));
        assert!(!filter.matches(Path::new("/m/entities/.hidden.md")));
        assert!(!filter.matches(Path::new("/")));
    }

    #[test]
    fn test_relevant_event_kinds() {
        use notify::event::{AccessKind, CreateKind, RemoveKind};
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
    }

    #[tokio::test]
    async fn test_burst_produces_single_batch() {
        let (tx, batches, handle) = recording_debouncer(Duration::from_millis(100));

        for name in ["a.md", "b.md", "a.md", "c.jsonl"] {
            tx.send(PathBuf::from(name)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        {
            let batches = batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(
                batches[0],
                vec![
                    PathBuf::from("a.md"),
                    PathBuf::from("b.md"),
                    PathBuf::from("c.jsonl")
                ]
            );
        }

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_separate_bursts_produce_separate_batches() {
        let (tx, batches, handle) = recording_debouncer(Duration::from_millis(50));

        tx.send(PathBuf::from("a.md")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        tx.send(PathBuf::from("b.md")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(batches.lock().unwrap().len(), 2);
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_paths_flush_on_close() {
        let (tx, batches, handle) = recording_debouncer(Duration::from_secs(30));

        tx.send(PathBuf::from("a.md")).await.unwrap();
        tx.send(PathBuf::from("b.md")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn test_idle_channel_produces_no_batches() {
        let (tx, batches, handle) = recording_debouncer(Duration::from_millis(10));
        drop(tx);
        handle.await.unwrap();
        assert!(batches.lock().unwrap().is_empty());
    }
}

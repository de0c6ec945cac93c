//! Command-line surface of the `mnemo` binary.
//!
//! Every command except `watch` produces one JSON document on stdout.

use crate::error::{ServerError, ServerResult};
use crate::watcher::SourceWatcher;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use mnemo_memory::temporal::parse_timestamp;
use mnemo_memory::{ConversationSearchOptions, ItemKind, MemoryConfig, MemoryEngine, SearchOptions};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "mnemo")]
#[command(about = "Personal memory layer for AI agents")]
#[command(version)]
pub struct Cli {
    /// Memory root directory (defaults to $MNEMO_HOME or ~/.mnemo)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Journal directory override
    #[arg(long, global = true)]
    pub journal: Option<PathBuf>,

    /// Entity document directory override
    #[arg(long, global = true)]
    pub entities: Option<PathBuf>,

    /// Transcript log directory override
    #[arg(long, global = true)]
    pub transcripts: Option<PathBuf>,

    /// Index data directory override
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search journal entries, entity sections and conversations
    Search {
        query: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        /// journal, entity-section or conversation-exchange
        #[arg(long = "type", value_parser = parse_kind)]
        kind: Option<ItemKind>,

        /// Only items at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,
    },

    /// Search past conversations, favouring the current project
    Conversations {
        query: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,

        /// Only return exchanges from the current project
        #[arg(long)]
        project_only: bool,

        /// Project directory to rank for (defaults to the working directory)
        #[arg(long)]
        context: Option<PathBuf>,
    },

    /// Reindex every source from scratch
    Rebuild,

    /// Reindex new and changed sources
    Update,

    /// Reindex a single source file
    IndexFile { path: PathBuf },

    /// Keep the index current as sources change
    Watch,

    /// Show what the index holds
    Stats,
}

fn parse_kind(raw: &str) -> Result<ItemKind, String> {
    raw.parse::<ItemKind>().map_err(|e| e.to_string())
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("not a timestamp or date: {}", raw))
}

impl Cli {
    /// Resolve the memory configuration from the environment and flags
    pub fn config(&self) -> MemoryConfig {
        let mut config = match &self.root {
            Some(root) => MemoryConfig::with_root(root),
            None => MemoryConfig::from_env(),
        };
        if let Some(dir) = &self.journal {
            config.journal_dir = dir.clone();
        }
        if let Some(dir) = &self.entities {
            config.entities_dir = dir.clone();
        }
        if let Some(dir) = &self.transcripts {
            config.transcripts_dir = dir.clone();
        }
        if let Some(dir) = &self.data {
            config.data_dir = dir.clone();
        }
        config.normalized()
    }

    /// Default tracing filter for this invocation
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "mnemo=debug,mnemo_server=debug,mnemo_memory=debug"
        } else {
            "mnemo=info,mnemo_server=info,mnemo_memory=info"
        }
    }
}

/// Run a one-shot command and return its JSON result.
///
/// `watch` is long-running and handled by [`watch`].
pub async fn execute(command: &Command, engine: &MemoryEngine) -> ServerResult<Value> {
    match command {
        Command::Search {
            query,
            limit,
            kind,
            since,
        } => {
            let options = SearchOptions {
                limit: *limit,
                kind: *kind,
                since: *since,
            };
            let outcome = engine.search(query, &options).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Command::Conversations {
            query,
            limit,
            project_only,
            context,
        } => {
            let context = match context {
                Some(path) => absolute(path)?,
                None => std::env::current_dir()?,
            };
            let options = ConversationSearchOptions {
                limit: *limit,
                project_only: *project_only,
                current_context: Some(context.to_string_lossy().to_string()),
            };
            let outcome = engine.search_conversations(query, &options).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Command::Rebuild => Ok(serde_json::to_value(engine.rebuild_index().await?)?),
        Command::Update => Ok(serde_json::to_value(engine.update_index().await?)?),
        Command::IndexFile { path } => {
            let path = absolute(path)?;
            let report = engine.index_single_source(&path).await?;
            Ok(json!({
                "path": path,
                "report": report,
            }))
        }
        Command::Stats => Ok(serde_json::to_value(engine.stats().await?)?),
        Command::Watch => Err(ServerError::InvalidArgument(
            "watch is not a one-shot command".to_string(),
        )),
    }
}

/// Bring the index up to date, then follow source changes until Ctrl-C.
pub async fn watch(engine: Arc<MemoryEngine>) -> ServerResult<()> {
    let report = engine.update_index().await?;
    tracing::info!(
        "Index ready: {} items ({} files updated)",
        report.item_count,
        report.files_updated
    );

    let watcher = SourceWatcher::start(Arc::clone(&engine))?;
    tokio::signal::ctrl_c().await?;

    tracing::info!("Stopping watcher");
    watcher.stop().await;
    Ok(())
}

fn absolute(path: &Path) -> ServerResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_memory::{EmbeddingGateway, MemoryVectorStore};
    use tempfile::TempDir;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingGateway for LengthEmbedder {
        async fn embed(&self, text: &str) -> mnemo_memory::error::Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32 / 100.0])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> mnemo_memory::error::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![1.0, t.len() as f32 / 100.0])
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn engine(root: &Path) -> MemoryEngine {
        MemoryEngine::new(
            MemoryConfig::with_root(root),
            Arc::new(LengthEmbedder),
            Arc::new(MemoryVectorStore::new()),
        )
    }

    #[test]
    fn test_parse_search_flags() {
        let cli = Cli::try_parse_from([
            "mnemo",
            "search",
            "deploy failure",
            "--limit",
            "5",
            "--type",
            "journal",
            "--since",
            "2026-10-01",
        ])
        .unwrap();

        match cli.command {
            Command::Search {
                query,
                limit,
                kind,
                since,
            } => {
                assert_eq!(query, "deploy failure");
                assert_eq!(limit, 5);
                assert_eq!(kind, Some(ItemKind::Journal));
                assert!(since.is_some());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(Cli::try_parse_from(["mnemo", "search", "q", "--type", "podcast"]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_since() {
        assert!(Cli::try_parse_from(["mnemo", "search", "q", "--since", "last week"]).is_err());
    }

    #[test]
    fn test_directory_overrides() {
        let cli = Cli::try_parse_from([
            "mnemo",
            "stats",
            "--root",
            "/srv/mem",
            "--transcripts",
            "/logs",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.journal_dir, PathBuf::from("/srv/mem/journal"));
        assert_eq!(config.transcripts_dir, PathBuf::from("/logs"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/mem/index"));
    }

    #[test]
    fn test_relative_root_becomes_absolute() {
        let cli = Cli::try_parse_from(["mnemo", "--root", "mem", "update"]).unwrap();
        let config = cli.config();
        assert!(config.journal_dir.is_absolute());
        assert!(config.journal_dir.ends_with("mem/journal"));
        assert!(config.data_dir.ends_with("mem/index"));
    }

    #[tokio::test]
    async fn test_index_file_accepts_other_spelling_of_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("sub")).unwrap();
        let journal = temp.path().join("journal");
        std::fs::create_dir_all(&journal).unwrap();
        let partition = journal.join("2026-10-01.jsonl");
        std::fs::write(
            &partition,
            r#"{"topic":"ops","content":"rotated the on-call schedule"}"#,
        )
        .unwrap();

        let engine = engine(&temp.path().join("sub").join(".."));
        let command = Command::IndexFile {
            path: partition.clone(),
        };
        let output = execute(&command, &engine).await.unwrap();
        assert_eq!(output["report"]["filesUpdated"], 1);
        assert_eq!(output["report"]["itemCount"], 1);

        // Re-indexing through a second spelling does not double count
        let command = Command::IndexFile {
            path: temp.path().join("sub").join("..").join("journal").join("2026-10-01.jsonl"),
        };
        let output = execute(&command, &engine).await.unwrap();
        assert_eq!(output["report"]["itemCount"], 1);
    }

    #[test]
    fn test_verbose_filter() {
        let cli = Cli::try_parse_from(["mnemo", "-v", "update"]).unwrap();
        assert!(cli.log_filter().contains("debug"));
    }

    #[tokio::test]
    async fn test_update_reports_camel_case_counts() {
        let temp = TempDir::new().unwrap();
        let journal = temp.path().join("journal");
        std::fs::create_dir_all(&journal).unwrap();
        std::fs::write(
            journal.join("2026-10-01.jsonl"),
            r#"{"topic":"deploy","content":"rolled back the release","timestamp":"2026-10-01T10:00:00Z"}"#,
        )
        .unwrap();

        let engine = engine(temp.path());
        let output = execute(&Command::Update, &engine).await.unwrap();
        assert_eq!(output["itemCount"], 1);
        assert_eq!(output["filesUpdated"], 1);
        assert_eq!(output["skipped"], 0);
    }

    #[tokio::test]
    async fn test_search_on_empty_index_carries_hint() {
        let temp = TempDir::new().unwrap();
        let engine = engine(temp.path());
        let command = Command::Search {
            query: "anything".into(),
            limit: 10,
            kind: None,
            since: None,
        };

        let output = execute(&command, &engine).await.unwrap();
        assert_eq!(output["results"].as_array().map(Vec::len), Some(0));
        assert!(output["hint"].is_string());
    }

    #[tokio::test]
    async fn test_watch_is_not_one_shot() {
        let temp = TempDir::new().unwrap();
        let engine = engine(temp.path());
        let err = execute(&Command::Watch, &engine).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidArgument(_)));
    }
}

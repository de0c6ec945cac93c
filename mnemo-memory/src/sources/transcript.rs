//! Exchange extraction from transcript logs
//!
//! A transcript is an append-only JSONL log of agent session records. Most
//! of it is plumbing: tool calls, tool results, command echoes, injected
//! reminders. The extractor walks the records in order, holding at most one
//! pending user turn, and emits a [`ConversationExchange`] whenever an
//! assistant reply with text answers it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::item::{bounded, ConversationExchange, MemoryId, MemoryItem};
use crate::sources::record_lines;
use crate::temporal::parse_timestamp;

/// Block types that mark agent-internal tool traffic
const TOOL_BLOCK_TYPES: [&str; 4] = ["tool_use", "tool_result", "server_tool_use", "web_search_tool_result"];

/// Role of a transcript record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other,
}

/// One typed block of message content
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content: plain text or a list of typed blocks
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    fn has_tool_block(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Blocks(blocks) => blocks
                .iter()
                .any(|b| TOOL_BLOCK_TYPES.contains(&b.kind.as_str())),
        }
    }

    /// First non-empty plain-text block
    fn first_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()).filter(|t| !t.trim().is_empty()),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .find(|t| !t.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type", default)]
    record_type: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default, alias = "branch")]
    git_branch: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    is_meta: bool,
}

/// A parsed transcript record
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    /// Line index in the log
    pub position: usize,
    pub role: Role,
    pub content: Content,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub uuid: Option<String>,
}

impl TranscriptRecord {
    /// Parse one JSONL line; `None` for anything malformed.
    ///
    /// Accepts both the nested `{"type", "message": {"role", "content"}}`
    /// layout and flat `{"role", "content"}` records.
    pub fn parse_line(line: &str, position: usize) -> Option<Self> {
        let raw: RawRecord = serde_json::from_str(line).ok()?;

        let (message_role, message_content) = match raw.message {
            Some(message) => (message.role, message.content),
            None => (None, None),
        };

        let role_name = message_role.or(raw.role).or(raw.record_type);
        let role = match role_name.as_deref() {
            _ if raw.is_meta => Role::Other,
            Some("user") | Some("human") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => Role::Other,
        };

        Some(Self {
            position,
            role,
            content: message_content
                .or(raw.content)
                .unwrap_or(Content::Blocks(Vec::new())),
            cwd: raw.cwd.filter(|s| !s.is_empty()),
            branch: raw.git_branch.filter(|s| !s.is_empty()),
            timestamp: raw.timestamp.as_deref().and_then(parse_timestamp),
            session_id: raw.session_id.filter(|s| !s.is_empty()),
            uuid: raw.uuid.filter(|s| !s.is_empty()),
        })
    }
}

/// Facts about the log file itself, used when records omit them
#[derive(Debug, Clone)]
pub struct LogContext {
    pub log_path: PathBuf,
    pub session_id: String,
    pub project_path: String,
    pub fallback_time: DateTime<Utc>,
}

impl LogContext {
    /// Derive fallbacks from the log's location on disk
    pub fn for_path(path: &Path, fallback_time: DateTime<Utc>) -> Self {
        Self {
            log_path: path.to_path_buf(),
            session_id: path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            project_path: path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            fallback_time,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTurn {
    text: String,
    turn_id: String,
    timestamp: Option<DateTime<Utc>>,
}

/// Length limits applied while extracting
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub min_prompt_chars: usize,
    pub max_prompt_chars: usize,
    pub max_summary_chars: usize,
}

impl From<&MemoryConfig> for ExtractLimits {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            min_prompt_chars: config.min_prompt_chars,
            max_prompt_chars: config.max_prompt_chars,
            max_summary_chars: config.max_summary_chars,
        }
    }
}

/// Streaming user/assistant pairing state machine
pub struct ExchangeExtractor {
    log: LogContext,
    limits: ExtractLimits,
    pending: Option<PendingTurn>,
    cwd: Option<String>,
    branch: Option<String>,
    session_id: Option<String>,
}

impl ExchangeExtractor {
    pub fn new(log: LogContext, limits: ExtractLimits) -> Self {
        Self {
            log,
            limits,
            pending: None,
            cwd: None,
            branch: None,
            session_id: None,
        }
    }

    /// Feed the next record; returns an exchange when this record completes one.
    pub fn push(&mut self, record: TranscriptRecord) -> Option<ConversationExchange> {
        if record.cwd.is_some() {
            self.cwd = record.cwd.clone();
        }
        if record.branch.is_some() {
            self.branch = record.branch.clone();
        }
        if record.session_id.is_some() {
            self.session_id = record.session_id.clone();
        }

        match record.role {
            Role::User => {
                self.accept_user(&record);
                None
            }
            Role::Assistant => self.accept_assistant(&record),
            Role::Other => None,
        }
    }

    fn accept_user(&mut self, record: &TranscriptRecord) {
        // Tool results ride on user records but are not human utterances
        if record.content.has_tool_block() {
            return;
        }

        let Some(text) = record.content.first_text() else {
            return;
        };
        let Some(prompt) = clean_user_text(text, self.limits.min_prompt_chars) else {
            return;
        };

        let turn_id = record
            .uuid
            .clone()
            .unwrap_or_else(|| format!("line-{}", record.position));

        self.pending = Some(PendingTurn {
            text: bounded(&prompt, self.limits.max_prompt_chars),
            turn_id,
            timestamp: record.timestamp,
        });
    }

    fn accept_assistant(&mut self, record: &TranscriptRecord) -> Option<ConversationExchange> {
        self.pending.as_ref()?;

        // A reply made only of tool calls does not answer the turn yet
        let summary = record.content.first_text()?.trim();
        let pending = self.pending.take()?;

        let project_path = self
            .cwd
            .clone()
            .unwrap_or_else(|| self.log.project_path.clone());
        let log_path = self.log.log_path.to_string_lossy().to_string();

        Some(ConversationExchange {
            id: MemoryId::derive(&log_path, &format!("turn-{}", pending.turn_id)),
            user_prompt: pending.text,
            assistant_summary: bounded(summary, self.limits.max_summary_chars),
            project_name: project_name(&project_path),
            project_path,
            branch: self.branch.clone(),
            timestamp: pending
                .timestamp
                .or(record.timestamp)
                .unwrap_or(self.log.fallback_time),
            session_id: self
                .session_id
                .clone()
                .unwrap_or_else(|| self.log.session_id.clone()),
            log_path,
            turn_id: pending.turn_id,
        })
    }
}

/// Extract every exchange from raw log contents, skipping malformed lines
pub fn extract_exchanges(
    text: impl AsRef<[u8]>,
    log: LogContext,
    limits: ExtractLimits,
) -> Vec<ConversationExchange> {
    let mut extractor = ExchangeExtractor::new(log, limits);
    let mut exchanges = Vec::new();

    for (position, line) in record_lines(text.as_ref()) {
        let Some(line) = line else {
            log::debug!("Skipping non-UTF-8 transcript line {}", position + 1);
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match TranscriptRecord::parse_line(line, position) {
            Some(record) => exchanges.extend(extractor.push(record)),
            None => log::debug!("Skipping malformed transcript line {}", position + 1),
        }
    }
    exchanges
}

/// Read a transcript log into exchange items
pub fn read_log(path: &Path, config: &MemoryConfig) -> Result<Vec<MemoryItem>> {
    let bytes = std::fs::read(path)?;
    let fallback_time = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let exchanges = extract_exchanges(
        &bytes,
        LogContext::for_path(path, fallback_time),
        ExtractLimits::from(config),
    );

    Ok(exchanges
        .iter()
        .map(|exchange| exchange.to_item(config.max_item_chars))
        .collect())
}

/// Last path component of a project directory
pub fn project_name(project_path: &str) -> String {
    Path::new(project_path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| project_path.to_string())
}

fn continuation_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(this session is being continued from a previous conversation|caveat: the messages below were generated by the user while running local commands|\[request interrupted by user)",
        )
        .expect("valid regex")
    })
}

fn command_wrapper() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^<(local-command-stdout|local-command-stderr|command-name|command-message|command-args|system-reminder|bash-input|bash-stdout|bash-stderr)\b[^>]*>",
        )
        .expect("valid regex")
    })
}

fn context_envelope() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<([a-z_-]*context)\b[^>]*>").expect("valid regex"))
}

fn user_message_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*User message:[ \t]*").expect("valid regex"))
}

/// Apply the noise rules to a user turn's text; `None` means "not a human
/// utterance". Context envelopes are unwrapped to their user payload.
pub fn clean_user_text(text: &str, min_chars: usize) -> Option<String> {
    let text = text.trim();

    if continuation_marker().is_match(text) || command_wrapper().is_match(text) {
        return None;
    }

    let text = match context_envelope().captures(text) {
        Some(caps) => {
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let marker = user_message_marker().find(text)?;
            let payload = text[marker.end()..].trim();
            let closing = format!("</{}>", tag);
            payload
                .strip_suffix(closing.as_str())
                .unwrap_or(payload)
                .trim()
                .to_string()
        }
        None => text.to_string(),
    };

    if text.chars().count() < min_chars {
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExtractLimits {
        ExtractLimits::from(&MemoryConfig::with_root("/m"))
    }

    fn log_context() -> LogContext {
        LogContext::for_path(
            Path::new("/m/transcripts/proj/session-1.jsonl"),
            "2026-10-01T00:00:00Z".parse().unwrap(),
        )
    }

    fn run(lines: &[&str]) -> Vec<ConversationExchange> {
        extract_exchanges(&lines.join("\n"), log_context(), limits())
    }

    #[test]
    fn test_tool_result_does_not_disturb_pending_turn() {
        let exchanges = run(&[
            r#"{"type":"user","message":{"role":"user","content":"Fix the bug"},"cwd":"/work/api","sessionId":"s1","uuid":"u1","timestamp":"2026-10-10T10:00:00Z"}"#,
            r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Fixed it by adding a mutex"}]}}"#,
        ]);

        assert_eq!(exchanges.len(), 1);
        let exchange = &exchanges[0];
        assert_eq!(exchange.user_prompt, "Fix the bug");
        assert_eq!(exchange.assistant_summary, "Fixed it by adding a mutex");
        assert_eq!(exchange.project_path, "/work/api");
        assert_eq!(exchange.project_name, "api");
        assert_eq!(exchange.session_id, "s1");
        assert_eq!(exchange.turn_id, "u1");
        assert_eq!(exchange.timestamp.to_rfc3339(), "2026-10-10T10:00:00+00:00");
    }

    #[test]
    fn test_command_output_is_never_pending() {
        let exchanges = run(&[
            r#"{"role":"user","content":"<local-command-stdout>ls output</local-command-stdout>"}"#,
            r#"{"role":"assistant","content":"Here is the listing you asked for"}"#,
        ]);
        assert!(exchanges.is_empty());
    }

    #[test]
    fn test_noise_keeps_earlier_pending_turn() {
        let exchanges = run(&[
            r#"{"role":"user","content":"Please refactor the parser"}"#,
            r#"{"role":"user","content":"<system-reminder>todo list changed</system-reminder>"}"#,
            r#"{"role":"assistant","content":"Refactored into three passes"}"#,
        ]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].user_prompt, "Please refactor the parser");
    }

    #[test]
    fn test_short_and_continuation_turns_are_noise() {
        assert!(clean_user_text("ok thx", 10).is_none());
        assert!(clean_user_text(
            "This session is being continued from a previous conversation that ran out of context.",
            10
        )
        .is_none());
        assert!(clean_user_text("<command-name>/clear</command-name>", 10).is_none());
        assert_eq!(
            clean_user_text("  How do I rotate the keys?  ", 10).as_deref(),
            Some("How do I rotate the keys?")
        );
    }

    #[test]
    fn test_context_envelope_is_unwrapped() {
        let wrapped = "<memory-context>\nRelevant notes: ...\n\nUser message: Why is the cache cold?\n</memory-context>";
        assert_eq!(
            clean_user_text(wrapped, 10).as_deref(),
            Some("Why is the cache cold?")
        );

        let no_marker = "<memory-context>\nRelevant notes only\n</memory-context>";
        assert!(clean_user_text(no_marker, 10).is_none());
    }

    #[test]
    fn test_newer_user_turn_overwrites_unanswered_one() {
        let exchanges = run(&[
            r#"{"role":"user","content":"First question nobody answered"}"#,
            r#"{"role":"user","content":"Second question that gets answered"}"#,
            r#"{"role":"assistant","content":"Answer to the second"}"#,
        ]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].user_prompt, "Second question that gets answered");
    }

    #[test]
    fn test_assistant_without_pending_yields_nothing() {
        let exchanges = run(&[
            r#"{"role":"assistant","content":"Unprompted remark"}"#,
            r#"{"role":"user","content":"A real question here"}"#,
            r#"{"role":"assistant","content":"A real answer"}"#,
            r#"{"role":"assistant","content":"A follow-up with nothing pending"}"#,
        ]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].assistant_summary, "A real answer");
    }

    #[test]
    fn test_tool_only_reply_waits_for_text() {
        let exchanges = run(&[
            r#"{"role":"user","content":"Run the migrations please"}"#,
            r#"{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"bash","input":{}}]}"#,
            r#"{"role":"assistant","content":[{"type":"text","text":"Migrations applied"}]}"#,
        ]);
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].assistant_summary, "Migrations applied");
    }

    #[test]
    fn test_malformed_lines_do_not_abort_scan() {
        let exchanges = run(&[
            "{not json",
            r#"{"role":"user","content":[1,2,3]}"#,
            r#"{"role":"user","content":"Question after garbage"}"#,
            r#"{"role":"assistant","content":"Still answered"}"#,
        ]);
        assert_eq!(exchanges.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_drop_log() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(br#"{"role":"user","content":"bad byte "#);
        bytes.push(0xff);
        bytes.extend_from_slice(b"\"}\n");
        bytes.extend_from_slice(br#"{"role":"user","content":"Why does the build hang?"}"#);
        bytes.push(b'\n');
        bytes.extend_from_slice(br#"{"role":"assistant","content":"A stale lock file"}"#);

        let exchanges = extract_exchanges(&bytes, log_context(), limits());
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].user_prompt, "Why does the build hang?");
        assert_eq!(exchanges[0].turn_id, "line-1");
    }

    #[test]
    fn test_meta_records_are_ignored() {
        let exchanges = run(&[
            r#"{"type":"user","isMeta":true,"message":{"role":"user","content":"Injected meta text long enough"}}"#,
            r#"{"role":"assistant","content":"Reply to nothing"}"#,
        ]);
        assert!(exchanges.is_empty());
    }

    #[test]
    fn test_lengths_are_bounded() {
        let long_prompt = "q".repeat(1500);
        let long_reply = "a".repeat(900);
        let user = format!(r#"{{"role":"user","content":"{}"}}"#, long_prompt);
        let assistant = format!(r#"{{"role":"assistant","content":"{}"}}"#, long_reply);
        let exchanges = run(&[&user, &assistant]);

        assert_eq!(exchanges[0].user_prompt.len(), 1000);
        assert_eq!(exchanges[0].assistant_summary.len(), 500);
    }

    #[test]
    fn test_fallbacks_from_log_location() {
        let exchanges = run(&[
            r#"{"role":"user","content":"Where are the fixtures kept?"}"#,
            r#"{"role":"assistant","content":"Under tests/fixtures"}"#,
        ]);
        let exchange = &exchanges[0];
        assert_eq!(exchange.session_id, "session-1");
        assert_eq!(exchange.project_path, "/m/transcripts/proj");
        assert_eq!(exchange.project_name, "proj");
        assert_eq!(exchange.turn_id, "line-0");
        assert_eq!(exchange.timestamp.to_rfc3339(), "2026-10-01T00:00:00+00:00");
    }

    #[test]
    fn test_exchange_ids_are_deterministic() {
        let lines = [
            r#"{"role":"user","content":"Deterministic question"}"#,
            r#"{"role":"assistant","content":"Deterministic answer"}"#,
        ];
        assert_eq!(run(&lines)[0].id, run(&lines)[0].id);
    }
}

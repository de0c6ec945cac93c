//! Memory item types
//!
//! Core types for the units of text that get embedded and indexed.
//! Metadata is a tagged union per item kind; it is flattened into a plain
//! string map only when it crosses into the vector store.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Stable identifier for memory items
///
/// Derived from the source path and a positional locator (line index,
/// heading index, turn id), so indexing unchanged content again upserts
/// the same ids instead of creating duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Derive the id for `locator` within `source`
    pub fn derive(source: &str, locator: &str) -> Self {
        let name = format!("{}#{}", source, locator);
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()))
    }

    /// Derive the id for `locator` within the file at `path`
    pub fn for_path(path: &Path, locator: &str) -> Self {
        Self::derive(&path.to_string_lossy(), locator)
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    Journal,
    EntitySection,
    ConversationExchange,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::EntitySection => "entity-section",
            Self::ConversationExchange => "conversation-exchange",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "journal" => Ok(Self::Journal),
            "entity-section" | "entity" => Ok(Self::EntitySection),
            "conversation-exchange" | "conversation" => Ok(Self::ConversationExchange),
            other => Err(MemoryError::other(format!("Unknown item type: {}", other))),
        }
    }
}

/// Kind-specific metadata carried by a memory item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ItemMetadata {
    /// One journal record
    Journal { topic: String },
    /// One section of an entity document
    #[serde(rename_all = "camelCase")]
    EntitySection {
        entity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        section: Option<String>,
    },
    /// One reconstructed user/assistant exchange
    #[serde(rename_all = "camelCase")]
    ConversationExchange {
        user_prompt: String,
        assistant_summary: String,
        project_name: String,
        project_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        session_id: String,
        turn_id: String,
    },
}

impl ItemMetadata {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Journal { .. } => ItemKind::Journal,
            Self::EntitySection { .. } => ItemKind::EntitySection,
            Self::ConversationExchange { .. } => ItemKind::ConversationExchange,
        }
    }
}

/// One embeddable, indexed unit of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub id: MemoryId,
    /// Text that is actually embedded (bounded)
    pub content: String,
    /// Path of the file this item came from
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metadata: ItemMetadata,
}

impl MemoryItem {
    pub fn kind(&self) -> ItemKind {
        self.metadata.kind()
    }

    /// Section label, for entity sections that have one
    pub fn section(&self) -> Option<&str> {
        match &self.metadata {
            ItemMetadata::EntitySection { section, .. } => section.as_deref(),
            _ => None,
        }
    }

    /// Context identifier used for the ranking boost (the project path of
    /// an exchange; other kinds have none)
    pub fn context(&self) -> Option<&str> {
        match &self.metadata {
            ItemMetadata::ConversationExchange { project_path, .. } => Some(project_path),
            _ => None,
        }
    }

    /// Flatten into the string map stored next to the vector
    pub fn to_fields(&self) -> Result<BTreeMap<String, String>> {
        let value = serde_json::to_value(self)?;
        let object = match value {
            serde_json::Value::Object(object) => object,
            _ => return Err(MemoryError::other("memory item did not serialize to a map")),
        };

        Ok(object
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect())
    }

    /// Rebuild a typed item from its stored string map
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

/// One user utterance paired with the assistant's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExchange {
    pub id: MemoryId,
    pub user_prompt: String,
    pub assistant_summary: String,
    pub project_name: String,
    pub project_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    /// Transcript log this exchange was read from
    pub log_path: String,
    pub turn_id: String,
}

impl ConversationExchange {
    /// Convert into the indexed representation
    pub fn to_item(&self, max_chars: usize) -> MemoryItem {
        let content = bounded(
            &format!(
                "User: {}\nAssistant: {}",
                self.user_prompt, self.assistant_summary
            ),
            max_chars,
        );

        MemoryItem {
            id: self.id,
            content,
            source: self.log_path.clone(),
            timestamp: Some(self.timestamp),
            metadata: ItemMetadata::ConversationExchange {
                user_prompt: self.user_prompt.clone(),
                assistant_summary: self.assistant_summary.clone(),
                project_name: self.project_name.clone(),
                project_path: self.project_path.clone(),
                branch: self.branch.clone(),
                session_id: self.session_id.clone(),
                turn_id: self.turn_id.clone(),
            },
        }
    }

    /// Recover the exchange from an indexed item
    pub fn from_item(item: &MemoryItem) -> Option<Self> {
        match &item.metadata {
            ItemMetadata::ConversationExchange {
                user_prompt,
                assistant_summary,
                project_name,
                project_path,
                branch,
                session_id,
                turn_id,
            } => Some(Self {
                id: item.id,
                user_prompt: user_prompt.clone(),
                assistant_summary: assistant_summary.clone(),
                project_name: project_name.clone(),
                project_path: project_path.clone(),
                branch: branch.clone(),
                timestamp: item.timestamp?,
                session_id: session_id.clone(),
                log_path: item.source.clone(),
                turn_id: turn_id.clone(),
            }),
            _ => None,
        }
    }
}

/// Truncate to at most `max_chars` characters, on a char boundary
pub fn bounded(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> ConversationExchange {
        ConversationExchange {
            id: MemoryId::derive("/logs/s1.jsonl", "turn-1"),
            user_prompt: "Fix the bug".into(),
            assistant_summary: "Fixed it by adding a mutex".into(),
            project_name: "api".into(),
            project_path: "/work/api".into(),
            branch: Some("main".into()),
            timestamp: "2026-10-01T12:00:00Z".parse().unwrap(),
            session_id: "s1".into(),
            log_path: "/logs/s1.jsonl".into(),
            turn_id: "turn-1".into(),
        }
    }

    #[test]
    fn test_memory_id_is_deterministic() {
        let a = MemoryId::derive("/journal/2026-10-01.jsonl", "0");
        let b = MemoryId::derive("/journal/2026-10-01.jsonl", "0");
        let c = MemoryId::derive("/journal/2026-10-01.jsonl", "1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_memory_id_parse() {
        let id = MemoryId::derive("x", "y");
        let parsed: MemoryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_item_kind_from_str() {
        assert_eq!("journal".parse::<ItemKind>().unwrap(), ItemKind::Journal);
        assert_eq!(
            "entity-section".parse::<ItemKind>().unwrap(),
            ItemKind::EntitySection
        );
        assert!("bogus".parse::<ItemKind>().is_err());
    }

    #[test]
    fn test_fields_carry_type_tag() {
        let item = MemoryItem {
            id: MemoryId::derive("/e/alice.md", "section-0"),
            content: "Role: engineer".into(),
            source: "/e/alice.md".into(),
            timestamp: None,
            metadata: ItemMetadata::EntitySection {
                entity: "alice".into(),
                section: Some("Role".into()),
            },
        };

        let fields = item.to_fields().unwrap();
        assert_eq!(fields.get("type").map(String::as_str), Some("entity-section"));
        assert_eq!(fields.get("section").map(String::as_str), Some("Role"));
        assert!(!fields.contains_key("timestamp"));

        let back = MemoryItem::from_fields(&fields).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_exchange_survives_store_boundary() {
        let original = exchange();
        let fields = original.to_item(2000).to_fields().unwrap();
        let item = MemoryItem::from_fields(&fields).unwrap();

        assert_eq!(item.kind(), ItemKind::ConversationExchange);
        assert_eq!(item.context(), Some("/work/api"));
        assert_eq!(ConversationExchange::from_item(&item), Some(original));
    }

    #[test]
    fn test_exchange_content_is_bounded() {
        let item = exchange().to_item(10);
        assert_eq!(item.content.chars().count(), 10);
    }

    #[test]
    fn test_bounded_respects_char_boundaries() {
        assert_eq!(bounded("héllo wörld", 4), "héll");
        assert_eq!(bounded("short", 100), "short");
    }
}

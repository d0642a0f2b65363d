//! Tape data model
//!
//! A tape is an append-only log of immutable entries; this module holds the
//! entry and metadata shapes plus the in-memory [`Manifest`] that registers
//! tapes and anchors.
//!
//! Invariants:
//! - entry ids within a tape are strictly increasing and gapless
//! - entries are never mutated after append
//! - anchor names are unique in the manifest; creating an anchor under an
//!   existing name replaces it
//! - fork links always point child → parent; back-references resolve by id
//!   lookup through the manifest

use crate::error::{AgentError, AgentResult};
use crate::llm::{StandardMessage, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the anchor every session tape starts with
pub const BOOTSTRAP_ANCHOR: &str = "session/start";

/// Entry kind; the payload schema is a function of this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A standard conversation message
    Message,
    /// Tool calls proposed by the model: `{"calls": [...]}`
    ToolCall,
    /// Results answering the preceding tool call: `{"results": [...]}`
    ToolResult,
    /// Named anchor point: `{"name": ..., "state": {...}}`
    Anchor,
    /// Runtime event: `{"name": ..., "data": {...}}`
    Event,
}

/// One immutable record on a tape
///
/// Serialized as one JSON object per NDJSON line:
/// `{"id":1,"kind":"message","payload":{...},"meta":{}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeEntry {
    /// Monotonically increasing id, stamped by the store on append
    pub id: u64,
    /// Entry kind
    pub kind: EntryKind,
    /// Kind-specific payload
    pub payload: serde_json::Value,
    /// Free-form metadata
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl TapeEntry {
    /// Build an unstamped entry; the store assigns the id on append
    pub fn new(kind: EntryKind, payload: serde_json::Value) -> Self {
        Self {
            id: 0,
            kind,
            payload,
            meta: serde_json::Map::new(),
        }
    }

    /// Entry holding a standard conversation message
    pub fn message(message: &StandardMessage) -> Self {
        let payload = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
        Self::new(EntryKind::Message, payload)
    }

    /// Entry holding a batch of tool calls
    pub fn tool_call(calls: &[ToolCall]) -> Self {
        let calls = serde_json::to_value(calls).unwrap_or(serde_json::Value::Null);
        Self::new(EntryKind::ToolCall, serde_json::json!({"calls": calls}))
    }

    /// Entry holding the results answering a tool call entry
    pub fn tool_result(results: Vec<serde_json::Value>) -> Self {
        Self::new(EntryKind::ToolResult, serde_json::json!({"results": results}))
    }

    /// Anchor entry
    pub fn anchor(name: &str, state: serde_json::Value) -> Self {
        Self::new(
            EntryKind::Anchor,
            serde_json::json!({"name": name, "state": state}),
        )
    }

    /// Event entry
    pub fn event(name: &str, data: serde_json::Value) -> Self {
        Self::new(
            EntryKind::Event,
            serde_json::json!({"name": name, "data": data}),
        )
    }

    /// The anchor name, for anchor entries
    pub fn anchor_name(&self) -> Option<&str> {
        if self.kind != EntryKind::Anchor {
            return None;
        }
        self.payload.get("name").and_then(|v| v.as_str())
    }

    /// Attach a metadata key
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// Metadata for one tape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeMeta {
    /// Tape id
    pub id: String,
    /// Log file name under the store root
    pub file: String,
    /// Optional human title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fork origin: `(source_tape_id, split_entry_id)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<(String, u64)>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Named pointer to a specific entry on a specific tape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Unique anchor name
    pub name: String,
    /// Tape the anchor points into
    pub tape_id: String,
    /// Entry the anchor points at
    pub entry_id: u64,
    /// Arbitrary state attached to the anchor
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Registry of tapes and anchors
///
/// Persisted as `manifest.json` under the store root. Every tape referenced
/// by a parent link must exist; every anchor references an existing tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Tape id → metadata
    pub tapes: HashMap<String, TapeMeta>,
    /// Anchor name → anchor
    pub anchors: HashMap<String, Anchor>,
}

impl Manifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    /// Create an empty manifest
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            tapes: HashMap::new(),
            anchors: HashMap::new(),
        }
    }

    /// Register a new tape
    pub fn create_tape(
        &mut self,
        tape_id: &str,
        file: Option<String>,
        title: Option<String>,
        parent: Option<(String, u64)>,
    ) -> &TapeMeta {
        let file = file.unwrap_or_else(|| default_file_name(tape_id));
        let meta = TapeMeta {
            id: tape_id.to_string(),
            file,
            title,
            parent,
            created_at: Utc::now(),
        };
        self.tapes.insert(tape_id.to_string(), meta);
        // Entry was just inserted under this key.
        &self.tapes[tape_id]
    }

    /// Look up tape metadata
    pub fn get_tape(&self, tape_id: &str) -> Option<&TapeMeta> {
        self.tapes.get(tape_id)
    }

    /// Remove a tape from the registry
    pub fn delete_tape(&mut self, tape_id: &str) -> Option<TapeMeta> {
        self.tapes.remove(tape_id)
    }

    /// Register a fork of `source_id` splitting at `split_entry_id`
    ///
    /// The child gets its own log file; reads resolve the parent chain.
    pub fn fork_tape(
        &mut self,
        source_id: &str,
        new_id: &str,
        split_entry_id: u64,
    ) -> AgentResult<&TapeMeta> {
        if self.get_tape(source_id).is_none() {
            return Err(AgentError::TapeNotFound(source_id.to_string()));
        }
        Ok(self.create_tape(
            new_id,
            None,
            None,
            Some((source_id.to_string(), split_entry_id)),
        ))
    }

    /// Create or replace an anchor
    pub fn create_anchor(
        &mut self,
        name: &str,
        tape_id: &str,
        entry_id: u64,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> &Anchor {
        let anchor = Anchor {
            name: name.to_string(),
            tape_id: tape_id.to_string(),
            entry_id,
            state,
            created_at: Utc::now(),
        };
        self.anchors.insert(name.to_string(), anchor);
        &self.anchors[name]
    }

    /// Look up an anchor
    pub fn get_anchor(&self, name: &str) -> Option<&Anchor> {
        self.anchors.get(name)
    }

    /// Remove an anchor
    pub fn delete_anchor(&mut self, name: &str) -> Option<Anchor> {
        self.anchors.remove(name)
    }

    /// Resolve an anchor name to its entry id
    pub fn resolve_anchor(&self, name: &str) -> AgentResult<u64> {
        self.get_anchor(name)
            .map(|a| a.entry_id)
            .ok_or_else(|| AgentError::AnchorNotFound(name.to_string()))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// File name for a tape id, with path-hostile characters replaced
pub fn default_file_name(tape_id: &str) -> String {
    let safe: String = tape_id
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '_',
            other => other,
        })
        .collect();
    format!("{}.jsonl", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ndjson_round_trip() {
        let entry = TapeEntry {
            id: 3,
            kind: EntryKind::Message,
            payload: serde_json::json!({"role": "user", "content": "hi"}),
            meta: serde_json::Map::new(),
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"kind\":\"message\""));
        let back: TapeEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_entry_kinds_snake_case() {
        let entry = TapeEntry::tool_result(vec![serde_json::json!(7)]);
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"tool_result\""));
    }

    #[test]
    fn test_anchor_entry_name() {
        let entry = TapeEntry::anchor(BOOTSTRAP_ANCHOR, serde_json::json!({}));
        assert_eq!(entry.anchor_name(), Some(BOOTSTRAP_ANCHOR));

        let other = TapeEntry::event("loop.result", serde_json::json!({}));
        assert_eq!(other.anchor_name(), None);
    }

    #[test]
    fn test_manifest_create_and_fork() {
        let mut manifest = Manifest::new();
        manifest.create_tape("telegram:42", None, Some("chat".to_string()), None);
        assert!(manifest.get_tape("telegram:42").is_some());

        let child = manifest.fork_tape("telegram:42", "telegram:42-fork", 5).unwrap();
        assert_eq!(child.parent, Some(("telegram:42".to_string(), 5)));
    }

    #[test]
    fn test_fork_unknown_source_fails() {
        let mut manifest = Manifest::new();
        let result = manifest.fork_tape("missing", "child", 1);
        assert!(matches!(result, Err(AgentError::TapeNotFound(_))));
    }

    #[test]
    fn test_anchor_round_trip() {
        let mut manifest = Manifest::new();
        manifest.create_tape("t", None, None, None);
        manifest.create_anchor("session/start", "t", 1, serde_json::Map::new());

        let anchor = manifest.get_anchor("session/start").unwrap();
        assert_eq!(anchor.tape_id, "t");
        assert_eq!(manifest.resolve_anchor("session/start").unwrap(), 1);
        assert!(matches!(
            manifest.resolve_anchor("missing"),
            Err(AgentError::AnchorNotFound(_))
        ));
    }

    #[test]
    fn test_anchor_names_are_unique() {
        let mut manifest = Manifest::new();
        manifest.create_tape("a", None, None, None);
        manifest.create_tape("b", None, None, None);
        manifest.create_anchor("mark", "a", 1, serde_json::Map::new());
        manifest.create_anchor("mark", "b", 2, serde_json::Map::new());

        assert_eq!(manifest.anchors.len(), 1);
        assert_eq!(manifest.get_anchor("mark").unwrap().tape_id, "b");
    }

    #[test]
    fn test_default_file_name_sanitizes() {
        assert_eq!(default_file_name("telegram:42"), "telegram_42.jsonl");
        assert_eq!(default_file_name("a/b c"), "a_b_c.jsonl");
    }
}

//! Per-session tape service
//!
//! [`TapeService`] is the façade one session uses for its tape: typed
//! append helpers, anchor handoffs, projection, reset against the bootstrap
//! anchor, and a small search over message content. [`SessionGraph`] is the
//! explicit fork tree rooted at a session's tape; edges carry the split
//! entry id and children always link to parents, never the reverse.

use crate::error::AgentResult;
use crate::llm::{StandardMessage, ToolCall};
use crate::tape::context::project;
use crate::tape::store::FileTapeStore;
use crate::tape::types::{EntryKind, TapeEntry, BOOTSTRAP_ANCHOR};
use std::collections::HashMap;
use std::sync::Arc;

/// Summary of a tape's state, for status surfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeInfo {
    /// Total entries on the tape
    pub entries: usize,
    /// Anchor entries on the tape
    pub anchors: usize,
    /// Name of the most recent anchor entry, if any
    pub last_anchor: Option<String>,
}

/// Session-scoped view over one tape
#[derive(Clone)]
pub struct TapeService {
    store: Arc<FileTapeStore>,
    tape_id: String,
}

impl TapeService {
    /// Open the service for a session, creating the tape and its bootstrap
    /// anchor when absent
    pub fn open(store: Arc<FileTapeStore>, tape_id: impl Into<String>) -> AgentResult<Self> {
        let tape_id = tape_id.into();
        store.create_tape(&tape_id, None)?;
        let service = Self { store, tape_id };
        service.ensure_bootstrap()?;
        Ok(service)
    }

    /// The tape this service wraps
    pub fn tape_id(&self) -> &str {
        &self.tape_id
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<FileTapeStore> {
        &self.store
    }

    /// Append a conversation message
    pub fn append_message(&self, message: &StandardMessage) -> AgentResult<TapeEntry> {
        self.store.append(&self.tape_id, TapeEntry::message(message))
    }

    /// Append a batch of tool calls
    pub fn append_tool_call(&self, calls: &[ToolCall]) -> AgentResult<TapeEntry> {
        self.store.append(&self.tape_id, TapeEntry::tool_call(calls))
    }

    /// Append the results answering the preceding tool call entry
    pub fn append_tool_result(&self, results: Vec<serde_json::Value>) -> AgentResult<TapeEntry> {
        self.store
            .append(&self.tape_id, TapeEntry::tool_result(results))
    }

    /// Append a runtime event
    pub fn append_event(&self, name: &str, data: serde_json::Value) -> AgentResult<TapeEntry> {
        self.store.append(&self.tape_id, TapeEntry::event(name, data))
    }

    /// Append an anchor entry and record it in the manifest
    pub fn handoff(
        &self,
        name: &str,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> AgentResult<TapeEntry> {
        let entry = self.store.append(
            &self.tape_id,
            TapeEntry::anchor(name, serde_json::Value::Object(state.clone())),
        )?;
        self.store
            .create_anchor(name, &self.tape_id, entry.id, state)?;
        Ok(entry)
    }

    /// All entries on the tape
    pub fn read_all(&self) -> AgentResult<Vec<TapeEntry>> {
        self.store.read(&self.tape_id, None, None)
    }

    /// Project the tape to standard messages
    pub fn project_messages(&self) -> AgentResult<Vec<StandardMessage>> {
        Ok(project(&self.read_all()?))
    }

    /// Summary counts for status surfaces
    pub fn info(&self) -> AgentResult<TapeInfo> {
        let entries = self.read_all()?;
        let anchors: Vec<&TapeEntry> = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Anchor)
            .collect();
        Ok(TapeInfo {
            entries: entries.len(),
            anchors: anchors.len(),
            last_anchor: anchors
                .last()
                .and_then(|e| e.anchor_name())
                .map(str::to_string),
        })
    }

    /// Truncate the tape back to its bootstrap anchor
    pub fn reset(&self) -> AgentResult<()> {
        self.store.reset(&self.tape_id)?;
        self.ensure_bootstrap()
    }

    /// Fork this tape, returning the child tape id
    pub fn fork(
        &self,
        new_tape_id: Option<&str>,
        from_entry: Option<u64>,
        from_anchor: Option<&str>,
    ) -> AgentResult<String> {
        self.store
            .fork(&self.tape_id, new_tape_id, from_entry, from_anchor)
    }

    /// Search message entries whose content matches a query
    ///
    /// Matching is token-wise and typo-tolerant: every query token must
    /// appear in some content word as an in-order character subsequence
    /// ("databse migrtion" finds "database migration"). Newest entries come
    /// first; at most `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> AgentResult<Vec<TapeEntry>> {
        let needles: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if needles.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.read_all()?;
        let matches: Vec<TapeEntry> = entries
            .into_iter()
            .rev()
            .filter(|entry| {
                if entry.kind != EntryKind::Message {
                    return false;
                }
                let content = entry
                    .payload
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                let words: Vec<&str> = content.split_whitespace().collect();
                needles
                    .iter()
                    .all(|needle| words.iter().any(|word| is_subsequence(needle, word)))
            })
            .take(limit)
            .collect();
        Ok(matches)
    }

    fn ensure_bootstrap(&self) -> AgentResult<()> {
        let has_anchor = self
            .read_all()?
            .iter()
            .any(|e| e.anchor_name() == Some(BOOTSTRAP_ANCHOR));
        if !has_anchor {
            self.handoff(BOOTSTRAP_ANCHOR, serde_json::Map::new())?;
        }
        Ok(())
    }
}

/// True when `needle`'s characters appear in `haystack` in order
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|c| chars.any(|h| h == c))
}

/// The fork tree rooted at one session's tape
#[derive(Debug, Clone)]
pub struct SessionGraph {
    root: String,
    children: HashMap<String, Vec<(String, u64)>>,
}

impl SessionGraph {
    /// Build the tree for a root tape from the store's fork links
    pub fn from_store(store: &FileTapeStore, root: impl Into<String>) -> Self {
        let root = root.into();
        let mut children: HashMap<String, Vec<(String, u64)>> = HashMap::new();
        for tape_id in store.tape_ids() {
            if let Some((parent, split)) = store.parent_of(&tape_id) {
                children.entry(parent).or_default().push((tape_id, split));
            }
        }
        for list in children.values_mut() {
            list.sort();
        }
        Self { root, children }
    }

    /// The root tape id
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Direct children of a tape as `(child_tape_id, split_entry_id)`
    pub fn children_of(&self, tape_id: &str) -> &[(String, u64)] {
        self.children
            .get(tape_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every tape reachable from the root, depth-first
    pub fn descendants(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(tape_id) = stack.pop() {
            for (child, _) in self.children_of(&tape_id) {
                stack.push(child.clone());
                out.push(child.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, TapeService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTapeStore::open(dir.path()).unwrap());
        let service = TapeService::open(store, "cli").unwrap();
        (dir, service)
    }

    #[test]
    fn test_open_creates_bootstrap_anchor() {
        let (_dir, service) = service();
        let entries = service.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].anchor_name(), Some(BOOTSTRAP_ANCHOR));
        assert_eq!(
            service.store().resolve_anchor(BOOTSTRAP_ANCHOR).unwrap(),
            1
        );
    }

    #[test]
    fn test_reset_rebuilds_bootstrap_anchor() {
        let (_dir, service) = service();
        for n in 0..9 {
            service
                .append_message(&StandardMessage::user(format!("m{}", n)))
                .unwrap();
        }

        service.reset().unwrap();

        let entries = service.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].anchor_name(), Some(BOOTSTRAP_ANCHOR));

        let info = service.info().unwrap();
        assert_eq!(info.entries, 1);
        assert_eq!(info.anchors, 1);
        assert_eq!(info.last_anchor.as_deref(), Some(BOOTSTRAP_ANCHOR));
    }

    #[test]
    fn test_info_counts() {
        let (_dir, service) = service();
        service
            .append_message(&StandardMessage::user("hi"))
            .unwrap();
        service
            .handoff("midpoint", serde_json::Map::new())
            .unwrap();

        let info = service.info().unwrap();
        assert_eq!(info.entries, 3);
        assert_eq!(info.anchors, 2);
        assert_eq!(info.last_anchor.as_deref(), Some("midpoint"));
    }

    #[test]
    fn test_search_supports_fuzzy_typo_matching() {
        let (_dir, service) = service();
        service
            .append_message(&StandardMessage::assistant(
                "Please review the database migration plan.",
            ))
            .unwrap();
        service
            .append_message(&StandardMessage::assistant("Unrelated note"))
            .unwrap();

        let matches = service.search("databse migrtion", 5).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].payload["content"]
            .as_str()
            .unwrap()
            .contains("database"));
    }

    #[test]
    fn test_search_newest_first_with_limit() {
        let (_dir, service) = service();
        service
            .append_message(&StandardMessage::assistant("Alpha report generated"))
            .unwrap();
        service
            .append_message(&StandardMessage::assistant("Alpha follow-up details"))
            .unwrap();

        let matches = service.search("alpha", 1).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].payload["content"]
            .as_str()
            .unwrap()
            .contains("follow-up"));
    }

    #[test]
    fn test_session_graph_links_child_to_parent() {
        let (_dir, service) = service();
        service
            .append_message(&StandardMessage::user("hi"))
            .unwrap();
        let child = service.fork(Some("cli-child"), None, None).unwrap();

        let graph = SessionGraph::from_store(service.store(), "cli");
        assert_eq!(graph.root(), "cli");
        let children = graph.children_of("cli");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, child);
        assert_eq!(children[0].1, 2);
        assert_eq!(graph.descendants(), vec![child]);
    }

    #[test]
    fn test_subsequence_matching() {
        assert!(is_subsequence("databse", "database"));
        assert!(is_subsequence("migrtion", "migration."));
        assert!(is_subsequence("alpha", "alpha"));
        assert!(!is_subsequence("beta", "alpha"));
    }
}

//! File-backed tape store
//!
//! Tapes live under one root directory: one NDJSON file per tape, a
//! `manifest.json` registering tapes and anchors, and an `archive/`
//! subdirectory for retired tapes.
//!
//! # Forking
//!
//! A fork never copies entries. The child tape records
//! `parent = (source, split)` and gets its own empty file; reads resolve
//! the parent chain up to the split id and then the child's file, and the
//! child's appends continue the id sequence from the split. Ids therefore
//! stay strictly increasing and gapless within every tape.
//!
//! # Reset
//!
//! `reset` truncates a tape strictly after its bootstrap anchor entry
//! (`session/start`), rebuilding the anchor when none exists. History a
//! forked tape shares with its parent is outside the truncation range.
//!
//! The store serializes all mutation under one lock; appends are atomic at
//! line granularity, so readers never observe a half-written entry.

use crate::error::{AgentError, AgentResult};
use crate::tape::types::{Anchor, Manifest, TapeEntry, BOOTSTRAP_ANCHOR};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const MANIFEST_FILE: &str = "manifest.json";
const ARCHIVE_DIR: &str = "archive";

struct StoreInner {
    manifest: Manifest,
    last_ids: HashMap<String, u64>,
}

/// Tape store rooted at one directory
pub struct FileTapeStore {
    root: PathBuf,
    inner: Mutex<StoreInner>,
}

impl FileTapeStore {
    /// Open (or create) a store at `root`
    pub fn open(root: impl Into<PathBuf>) -> AgentResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(ARCHIVE_DIR))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let raw = fs::read_to_string(&manifest_path)?;
            serde_json::from_str(&raw)
                .map_err(|e| AgentError::Serialization(format!("manifest: {}", e)))?
        } else {
            Manifest::new()
        };

        Ok(Self {
            root,
            inner: Mutex::new(StoreInner {
                manifest,
                last_ids: HashMap::new(),
            }),
        })
    }

    /// The store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, empty tape; a no-op when the id already exists
    pub fn create_tape(&self, tape_id: &str, title: Option<&str>) -> AgentResult<String> {
        let mut inner = self.lock();
        if inner.manifest.get_tape(tape_id).is_none() {
            inner
                .manifest
                .create_tape(tape_id, None, title.map(str::to_string), None);
            inner.last_ids.insert(tape_id.to_string(), 0);
            self.save_manifest(&inner)?;
            tracing::debug!(tape_id = %tape_id, "tape created");
        }
        Ok(tape_id.to_string())
    }

    /// Ids of every active tape
    pub fn tape_ids(&self) -> Vec<String> {
        let inner = self.lock();
        inner.manifest.tapes.keys().cloned().collect()
    }

    /// The title recorded for a tape
    pub fn get_title(&self, tape_id: &str) -> Option<String> {
        let inner = self.lock();
        inner
            .manifest
            .get_tape(tape_id)
            .and_then(|meta| meta.title.clone())
    }

    /// Fork origin of a tape: `(source_tape_id, split_entry_id)`
    pub fn parent_of(&self, tape_id: &str) -> Option<(String, u64)> {
        let inner = self.lock();
        inner
            .manifest
            .get_tape(tape_id)
            .and_then(|meta| meta.parent.clone())
    }

    /// Append an entry, stamping it with the next id
    pub fn append(&self, tape_id: &str, entry: TapeEntry) -> AgentResult<TapeEntry> {
        let mut inner = self.lock();
        self.append_locked(&mut inner, tape_id, entry)
    }

    /// Read entries in the half-open id range `[from, to)`
    ///
    /// A missing `from` reads from the start, a missing `to` reads to the
    /// end. Entries come back in ascending id order.
    pub fn read(
        &self,
        tape_id: &str,
        from: Option<u64>,
        to: Option<u64>,
    ) -> AgentResult<Vec<TapeEntry>> {
        let inner = self.lock();
        let entries = self.read_chain(&inner.manifest, tape_id)?;
        let from = from.unwrap_or(0);
        Ok(entries
            .into_iter()
            .filter(|e| e.id >= from && to.map_or(true, |to| e.id < to))
            .collect())
    }

    /// Id of the last entry on a tape (0 when empty)
    pub fn last_entry_id(&self, tape_id: &str) -> AgentResult<u64> {
        let mut inner = self.lock();
        self.last_id_locked(&mut inner, tape_id)
    }

    /// Fork a tape
    ///
    /// At most one of `from_entry` / `from_anchor` selects the split point;
    /// with neither, the fork splits at the source's tail. Returns the new
    /// tape id (generated when not supplied).
    pub fn fork(
        &self,
        source_tape_id: &str,
        new_tape_id: Option<&str>,
        from_entry: Option<u64>,
        from_anchor: Option<&str>,
    ) -> AgentResult<String> {
        if from_entry.is_some() && from_anchor.is_some() {
            return Err(AgentError::InvalidArgument(
                "fork takes at most one of from_entry / from_anchor".to_string(),
            ));
        }

        let mut inner = self.lock();
        let last = self.last_id_locked(&mut inner, source_tape_id)?;

        let split = match (from_entry, from_anchor) {
            (Some(entry_id), None) => {
                if entry_id > last {
                    return Err(AgentError::InvalidArgument(format!(
                        "split entry {} is beyond the tape end {}",
                        entry_id, last
                    )));
                }
                entry_id
            }
            (None, Some(anchor)) => inner.manifest.resolve_anchor(anchor)?,
            _ => last,
        };

        let new_id = match new_tape_id {
            Some(id) => id.to_string(),
            None => format!(
                "{}-fork-{}",
                source_tape_id,
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            ),
        };

        inner.manifest.fork_tape(source_tape_id, &new_id, split)?;
        inner.last_ids.insert(new_id.clone(), split);
        self.save_manifest(&inner)?;
        tracing::debug!(source = %source_tape_id, child = %new_id, split, "tape forked");
        Ok(new_id)
    }

    /// Create or replace a named anchor
    pub fn create_anchor(
        &self,
        name: &str,
        tape_id: &str,
        entry_id: u64,
        state: serde_json::Map<String, serde_json::Value>,
    ) -> AgentResult<()> {
        let mut inner = self.lock();
        if inner.manifest.get_tape(tape_id).is_none() {
            return Err(AgentError::TapeNotFound(tape_id.to_string()));
        }
        inner.manifest.create_anchor(name, tape_id, entry_id, state);
        self.save_manifest(&inner)?;
        Ok(())
    }

    /// Look up an anchor by name
    pub fn get_anchor(&self, name: &str) -> Option<Anchor> {
        let inner = self.lock();
        inner.manifest.get_anchor(name).cloned()
    }

    /// All anchors, unordered
    pub fn list_anchors(&self) -> Vec<Anchor> {
        let inner = self.lock();
        inner.manifest.anchors.values().cloned().collect()
    }

    /// Resolve an anchor name to its entry id
    pub fn resolve_anchor(&self, name: &str) -> AgentResult<u64> {
        let inner = self.lock();
        inner.manifest.resolve_anchor(name)
    }

    /// Delete an anchor by name
    pub fn delete_anchor(&self, name: &str) -> AgentResult<bool> {
        let mut inner = self.lock();
        let removed = inner.manifest.delete_anchor(name).is_some();
        if removed {
            self.save_manifest(&inner)?;
        }
        Ok(removed)
    }

    /// Move a tape out of the active set
    ///
    /// The log file moves under `archive/` (path returned); the tape and
    /// every anchor pointing into it leave the manifest. Not reversible
    /// through the store API.
    pub fn archive(&self, tape_id: &str) -> AgentResult<Option<PathBuf>> {
        let mut inner = self.lock();
        let meta = inner
            .manifest
            .delete_tape(tape_id)
            .ok_or_else(|| AgentError::TapeNotFound(tape_id.to_string()))?;

        inner.manifest.anchors.retain(|_, a| a.tape_id != tape_id);
        inner.last_ids.remove(tape_id);
        self.save_manifest(&inner)?;

        let source = self.root.join(&meta.file);
        if source.exists() {
            let target = self.root.join(ARCHIVE_DIR).join(&meta.file);
            fs::rename(&source, &target)?;
            tracing::info!(tape_id = %tape_id, target = %target.display(), "tape archived");
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// Truncate a tape strictly after its bootstrap anchor
    ///
    /// When no bootstrap anchor exists, the tape is emptied and a fresh one
    /// is appended. Anchors pointing into the truncated range are dropped,
    /// except the bootstrap anchor itself, which is re-pointed.
    pub fn reset(&self, tape_id: &str) -> AgentResult<()> {
        let mut inner = self.lock();
        let meta = inner
            .manifest
            .get_tape(tape_id)
            .ok_or_else(|| AgentError::TapeNotFound(tape_id.to_string()))?
            .clone();
        let parent_split = meta.parent.as_ref().map(|(_, s)| *s).unwrap_or(0);

        let entries = self.read_chain(&inner.manifest, tape_id)?;
        let bootstrap_id = entries
            .iter()
            .find(|e| e.anchor_name() == Some(BOOTSTRAP_ANCHOR))
            .map(|e| e.id);

        let keep_up_to = bootstrap_id.unwrap_or(parent_split);
        let own_kept: Vec<&TapeEntry> = entries
            .iter()
            .filter(|e| e.id > parent_split && e.id <= keep_up_to)
            .collect();

        let path = self.root.join(&meta.file);
        let mut lines = String::new();
        for entry in &own_kept {
            lines.push_str(&serde_json::to_string(entry)?);
            lines.push('\n');
        }
        fs::write(&path, lines)?;
        inner.last_ids.insert(tape_id.to_string(), keep_up_to);

        let anchor_id = match bootstrap_id {
            Some(id) => id,
            None => {
                let rebuilt = self.append_locked(
                    &mut inner,
                    tape_id,
                    TapeEntry::anchor(BOOTSTRAP_ANCHOR, serde_json::json!({})),
                )?;
                rebuilt.id
            }
        };

        // Drop anchors into the truncated range; re-point the bootstrap.
        inner.manifest.anchors.retain(|name, a| {
            !(a.tape_id == tape_id && a.entry_id > anchor_id && name != BOOTSTRAP_ANCHOR)
        });
        if let Some(anchor) = inner.manifest.anchors.get_mut(BOOTSTRAP_ANCHOR) {
            if anchor.tape_id == tape_id {
                anchor.entry_id = anchor_id;
            }
        }
        self.save_manifest(&inner)?;
        tracing::info!(tape_id = %tape_id, anchor_id, "tape reset");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append_locked(
        &self,
        inner: &mut StoreInner,
        tape_id: &str,
        mut entry: TapeEntry,
    ) -> AgentResult<TapeEntry> {
        let last = self.last_id_locked(inner, tape_id)?;
        entry.id = last + 1;

        let meta = inner
            .manifest
            .get_tape(tape_id)
            .ok_or_else(|| AgentError::TapeNotFound(tape_id.to_string()))?;
        let path = self.root.join(&meta.file);
        let line = serde_json::to_string(&entry)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;

        inner.last_ids.insert(tape_id.to_string(), entry.id);
        tracing::trace!(tape_id = %tape_id, id = entry.id, kind = ?entry.kind, "entry appended");
        Ok(entry)
    }

    fn last_id_locked(&self, inner: &mut StoreInner, tape_id: &str) -> AgentResult<u64> {
        if let Some(last) = inner.last_ids.get(tape_id) {
            return Ok(*last);
        }
        let entries = self.read_chain(&inner.manifest, tape_id)?;
        let last = entries.last().map(|e| e.id).unwrap_or(0);
        inner.last_ids.insert(tape_id.to_string(), last);
        Ok(last)
    }

    fn read_chain(&self, manifest: &Manifest, tape_id: &str) -> AgentResult<Vec<TapeEntry>> {
        let meta = manifest
            .get_tape(tape_id)
            .ok_or_else(|| AgentError::TapeNotFound(tape_id.to_string()))?;

        let mut entries = Vec::new();
        if let Some((parent_id, split)) = &meta.parent {
            let parent_entries = self.read_chain(manifest, parent_id)?;
            entries.extend(parent_entries.into_iter().filter(|e| e.id <= *split));
        }
        entries.extend(self.read_file(&self.root.join(&meta.file))?);
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> AgentResult<Vec<TapeEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TapeEntry = serde_json::from_str(line).map_err(|e| {
                AgentError::Serialization(format!("{}: {}", path.display(), e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn save_manifest(&self, inner: &StoreInner) -> AgentResult<()> {
        let raw = serde_json::to_string_pretty(&inner.manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), raw)?;
        Ok(())
    }
}

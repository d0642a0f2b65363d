//! Tape subsystem: append-only session logs
//!
//! - [`types`]: entries, tape metadata, anchors, and the manifest
//! - [`store`]: the NDJSON file store with fork/anchor/reset/archive
//! - [`context`]: projection of a tape slice to standard messages
//! - [`service`]: the per-session façade and the fork tree

pub mod context;
pub mod service;
pub mod store;
pub mod types;

pub use context::project;
pub use service::{SessionGraph, TapeInfo, TapeService};
pub use store::FileTapeStore;
pub use types::{Anchor, EntryKind, Manifest, TapeEntry, TapeMeta, BOOTSTRAP_ANCHOR};

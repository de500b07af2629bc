//! Parent documents, chunks, and the in-process document store
//!
//! The store is the engine's registry of ingested material: parent
//! texts for context expansion, chunk metadata for candidate assembly,
//! and per-document locks serializing ingest/delete of the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// An ingested source document. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentDocument {
    pub id: Uuid,

    /// Display name of the source (filename, URL, ...)
    pub source_name: String,

    /// Full extracted text
    pub full_text: String,

    /// Char offset of each page start -> page number.
    /// Empty map means an unpaginated source (everything is page 1).
    pub page_map: BTreeMap<usize, u32>,

    pub ingested_at: DateTime<Utc>,
}

impl ParentDocument {
    pub fn new(source_name: impl Into<String>, full_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            full_text: full_text.into(),
            page_map: BTreeMap::new(),
            ingested_at: Utc::now(),
        }
    }

    pub fn with_page_map(mut self, page_map: BTreeMap<usize, u32>) -> Self {
        self.page_map = page_map;
        self
    }

    /// Page covering the given char offset
    pub fn page_at(&self, offset: usize) -> u32 {
        self.page_map
            .range(..=offset)
            .next_back()
            .map(|(_, page)| *page)
            .unwrap_or(1)
    }

    /// Text length in chars (`char_range` units)
    pub fn char_len(&self) -> usize {
        self.full_text.chars().count()
    }

    /// Slice the text by char range, clamped to bounds
    pub fn slice_chars(&self, range: Range<usize>) -> String {
        self.full_text
            .chars()
            .skip(range.start)
            .take(range.len())
            .collect()
    }
}

/// A retrieval unit: a bounded sub-span of a parent document.
/// The embedding lives in the vector index, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub text: String,

    /// Char bounds within the parent text
    pub char_range: Range<usize>,

    pub page_number: u32,
    pub source_name: String,
}

#[derive(Default)]
struct StoreInner {
    parents: HashMap<Uuid, Arc<ParentDocument>>,
    chunks: HashMap<Uuid, Arc<Chunk>>,
    by_parent: HashMap<Uuid, Vec<Uuid>>,
}

/// In-process registry of parents and chunks.
///
/// Reads are lock-free with respect to each other; document mutation
/// goes through `document_lock` so ingest and delete of the same id
/// never interleave.
#[derive(Default)]
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-document async lock. Ingest/delete of one document hold this
    /// across their index writes; unrelated documents get unrelated locks.
    pub fn document_lock(&self, parent_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry");
        locks
            .entry(parent_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Register a parent and its chunks, replacing any prior generation
    /// of the same document id.
    pub fn insert_document(&self, parent: ParentDocument, chunks: Vec<Chunk>) {
        let mut inner = self.inner.write().expect("store write");
        if let Some(old_chunk_ids) = inner.by_parent.remove(&parent.id) {
            for chunk_id in old_chunk_ids {
                inner.chunks.remove(&chunk_id);
            }
        }

        let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        for chunk in chunks {
            inner.chunks.insert(chunk.id, Arc::new(chunk));
        }
        inner.by_parent.insert(parent.id, chunk_ids);
        inner.parents.insert(parent.id, Arc::new(parent));
    }

    /// Drop a parent and its chunks; returns the removed chunk ids
    pub fn remove_document(&self, parent_id: Uuid) -> Option<Vec<Uuid>> {
        let mut inner = self.inner.write().expect("store write");
        inner.parents.remove(&parent_id)?;
        let chunk_ids = inner.by_parent.remove(&parent_id).unwrap_or_default();
        for chunk_id in &chunk_ids {
            inner.chunks.remove(chunk_id);
        }
        Some(chunk_ids)
    }

    pub fn parent(&self, parent_id: Uuid) -> Option<Arc<ParentDocument>> {
        self.inner.read().expect("store read").parents.get(&parent_id).cloned()
    }

    pub fn chunk(&self, chunk_id: Uuid) -> Option<Arc<Chunk>> {
        self.inner.read().expect("store read").chunks.get(&chunk_id).cloned()
    }

    pub fn chunk_ids_of(&self, parent_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .expect("store read")
            .by_parent
            .get(&parent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_parent(&self, parent_id: Uuid) -> bool {
        self.inner.read().expect("store read").parents.contains_key(&parent_id)
    }

    pub fn parent_count(&self) -> usize {
        self.inner.read().expect("store read").parents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.read().expect("store read").chunks.len()
    }
}

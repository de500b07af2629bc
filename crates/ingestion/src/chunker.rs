//! Text chunking module
//!
//! Splits a parent document into overlapping child chunks tagged with
//! parent linkage, char bounds, and page numbers. Chunk ids are derived
//! from the parent id and chunk index, so re-ingesting the same
//! document produces the same ids.

use tracing::debug;
use uuid::Uuid;
use veridoc_common::errors::{EngineError, Result};
use veridoc_common::store::{Chunk, ParentDocument};

/// Split a parent document into overlapping chunks.
///
/// Windows are `chunk_size` chars wide and successive windows start
/// `chunk_size - chunk_overlap` chars after the previous one; the last
/// window is clamped to the text end. Units are chars throughout.
pub fn chunk_document(
    parent: &ParentDocument,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    if parent.full_text.trim().is_empty() {
        return Err(EngineError::Ingestion {
            message: "document text is empty".to_string(),
        });
    }
    if chunk_size == 0 {
        return Err(EngineError::Ingestion {
            message: "chunk_size must be positive".to_string(),
        });
    }
    if chunk_overlap >= chunk_size {
        return Err(EngineError::Ingestion {
            message: format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            ),
        });
    }

    let chars: Vec<char> = parent.full_text.chars().collect();
    let total_len = chars.len();
    let step = chunk_size - chunk_overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut index: u64 = 0;

    loop {
        let end = (start + chunk_size).min(total_len);
        let text: String = chars[start..end].iter().collect();

        chunks.push(Chunk {
            id: chunk_id(parent.id, index),
            parent_id: parent.id,
            text,
            char_range: start..end,
            page_number: parent.page_at(start),
            source_name: parent.source_name.clone(),
        });

        if end == total_len {
            break;
        }
        start += step;
        index += 1;
    }

    debug!(
        parent_id = %parent.id,
        chunk_count = chunks.len(),
        chunk_size,
        chunk_overlap,
        "Document chunked"
    );

    Ok(chunks)
}

/// Deterministic chunk id: v5 UUID in the parent's namespace
fn chunk_id(parent_id: Uuid, index: u64) -> Uuid {
    Uuid::new_v5(&parent_id, &index.to_be_bytes())
}

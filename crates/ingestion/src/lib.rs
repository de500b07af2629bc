//! Veridoc ingestion
//!
//! Turns parent documents into overlapping chunks and populates the
//! vector and keyword indices. Indexing side effects live in the
//! pipeline; the chunker itself is pure.

pub mod chunker;
pub mod pipeline;

pub use chunker::chunk_document;
pub use pipeline::{IngestReceipt, IngestionPipeline};

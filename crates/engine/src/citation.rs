//! Citation extraction
//!
//! Maps `[n]` markers in a generated answer back to the retrieved
//! candidates the generation step consumed. A marker `[n]` references
//! the n-th context block, which is `retrieved[n-1]`; markers outside
//! that range are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use veridoc_retrieval::SearchCandidate;

/// Pointer from an answer back to its supporting source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub source_name: String,
    pub page_number: u32,
    pub chunk_id: Uuid,
}

/// Extract ordered, de-duplicated citations from a draft answer.
///
/// Ordering follows first appearance in `retrieved`; duplicate
/// `(source_name, page_number)` pairs collapse to one entry. The output
/// can only reference chunks present in `retrieved`.
pub fn extract(draft_answer: &str, retrieved: &[SearchCandidate]) -> Vec<Citation> {
    let marker = regex_lite::Regex::new(r"\[(\d+)\]").expect("citation marker pattern");

    let mut referenced: HashSet<usize> = HashSet::new();
    for capture in marker.captures_iter(draft_answer) {
        if let Some(m) = capture.get(1) {
            if let Ok(ordinal) = m.as_str().parse::<usize>() {
                if ordinal >= 1 && ordinal <= retrieved.len() {
                    referenced.insert(ordinal);
                }
            }
        }
    }

    let mut seen: HashSet<(&str, u32)> = HashSet::new();
    let mut citations = Vec::new();
    for (idx, candidate) in retrieved.iter().enumerate() {
        if !referenced.contains(&(idx + 1)) {
            continue;
        }
        if seen.insert((candidate.source_name.as_str(), candidate.page_number)) {
            citations.push(Citation {
                source_name: candidate.source_name.clone(),
                page_number: candidate.page_number,
                chunk_id: candidate.chunk_id,
            });
        }
    }

    citations
}

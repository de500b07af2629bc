//! In-memory reference indices
//!
//! Process-local implementations of the index seams: a cosine-similarity
//! vector store and a BM25 keyword index. Suitable for tests and small
//! local corpora; production deployments plug in external stores.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;
use veridoc_common::errors::Result;
use veridoc_common::index::{IndexHit, KeywordIndex, VectorIndex};

/// Cosine-similarity vector store
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<(Uuid, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("vector index read").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let entries = self.entries.read().expect("vector index read");

        let mut hits: Vec<IndexHit> = entries
            .iter()
            .map(|(chunk_id, stored)| IndexHit {
                chunk_id: *chunk_id,
                score: cosine_similarity(embedding, stored),
            })
            .collect();

        // Stable sort: insertion order breaks score ties
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn upsert(&self, chunk_id: Uuid, embedding: Vec<f32>) -> Result<()> {
        let mut entries = self.entries.write().expect("vector index write");
        match entries.iter_mut().find(|(id, _)| *id == chunk_id) {
            Some(entry) => entry.1 = embedding,
            None => entries.push((chunk_id, embedding)),
        }
        Ok(())
    }

    async fn delete(&self, chunk_id: Uuid) -> Result<()> {
        let mut entries = self.entries.write().expect("vector index write");
        entries.retain(|(id, _)| *id != chunk_id);
        Ok(())
    }
}

/// BM25 parameters (standard Okapi values)
const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

struct KeywordEntry {
    chunk_id: Uuid,
    term_counts: HashMap<String, usize>,
    token_count: usize,
}

/// BM25 keyword index
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    entries: RwLock<Vec<KeywordEntry>>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

impl InMemoryKeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("keyword index read").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        let query_terms = tokenize(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().expect("keyword index read");
        let doc_count = entries.len();
        if doc_count == 0 {
            return Ok(Vec::new());
        }

        let avg_len = entries.iter().map(|e| e.token_count).sum::<usize>() as f32
            / doc_count as f32;

        // Document frequency per query term
        let mut df: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            let n = entries
                .iter()
                .filter(|e| e.term_counts.contains_key(term))
                .count();
            df.insert(term.as_str(), n);
        }

        let mut hits: Vec<IndexHit> = entries
            .iter()
            .filter_map(|entry| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let tf = *entry.term_counts.get(term).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let n = df[term.as_str()] as f32;
                    let idf = ((doc_count as f32 - n + 0.5) / (n + 0.5) + 1.0).ln();
                    let len_norm =
                        1.0 - BM25_B + BM25_B * entry.token_count as f32 / avg_len;
                    score += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
                }
                (score > 0.0).then(|| IndexHit {
                    chunk_id: entry.chunk_id,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn upsert(&self, chunk_id: Uuid, text: &str) -> Result<()> {
        let tokens = tokenize(text);
        let token_count = tokens.len();
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in tokens {
            *term_counts.entry(token).or_insert(0) += 1;
        }

        let entry = KeywordEntry {
            chunk_id,
            term_counts,
            token_count,
        };

        let mut entries = self.entries.write().expect("keyword index write");
        match entries.iter_mut().find(|e| e.chunk_id == chunk_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn delete(&self, chunk_id: Uuid) -> Result<()> {
        let mut entries = self.entries.write().expect("keyword index write");
        entries.retain(|e| e.chunk_id != chunk_id);
        Ok(())
    }
}

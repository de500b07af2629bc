//! Per-session request context
//!
//! Session-scoped counters (masked-PII tallies) live on an explicit
//! context object passed per request, never on a process-wide global.
//! Counters reset when a session starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Context carried through every query of one caller session
#[derive(Debug)]
pub struct SessionContext {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    queries_masked: AtomicU64,
    entities_masked: AtomicU64,
}

/// Point-in-time snapshot of session counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub queries_masked: u64,
    pub entities_masked: u64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            queries_masked: AtomicU64::new(0),
            entities_masked: AtomicU64::new(0),
        }
    }

    /// Record one masking pass over a query
    pub fn record_masking(&self, entities: usize) {
        if entities > 0 {
            self.queries_masked.fetch_add(1, Ordering::Relaxed);
            self.entities_masked
                .fetch_add(entities as u64, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            queries_masked: self.queries_masked.load(Ordering::Relaxed),
            entities_masked: self.entities_masked.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters (session restart semantics)
    pub fn reset(&self) {
        self.queries_masked.store(0, Ordering::Relaxed);
        self.entities_masked.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

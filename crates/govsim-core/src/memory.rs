//! Memory store contract and a default in-memory implementation
//!
//! Relevance scoring belongs to the store, not to the engine. The engine only
//! asks for the top-k memories against some focal points and writes entries.

use crate::error::{Error, Result};
use crate::types::MemoryEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A memory as presented to the Oracle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub created: DateTime<Utc>,
    pub text: String,
}

impl From<&MemoryEntry> for RetrievedMemory {
    fn from(entry: &MemoryEntry) -> Self {
        Self {
            created: entry.created,
            text: entry.text.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    /// Commit one entry. Visible to `retrieve` as soon as this returns.
    async fn store(&self, entry: MemoryEntry) -> Result<()>;

    async fn retrieve(&self, focal_points: &[String], top_k: usize) -> Result<Vec<RetrievedMemory>>;

    /// Persist whatever is buffered. Called at the end of every tick.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Vec-backed store with optional JSON persistence.
///
/// Ranking: always-salient entries first, then word overlap with the focal
/// points, then most recent.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<MemoryEntry>>,
    path: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back the store with a JSON file, loading existing entries if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                let entries: Vec<MemoryEntry> = serde_json::from_str(&content)?;
                info!("Loaded {} memories from {}", entries.len(), path.display());
                entries
            }
            Ok(_) => Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, entry: MemoryEntry) -> Result<()> {
        debug!(kind = ?entry.kind, salient = entry.always_salient, "store memory");
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn retrieve(&self, focal_points: &[String], top_k: usize) -> Result<Vec<RetrievedMemory>> {
        let entries = self.entries.read().await;
        let query = focal_points.join(" ");

        let mut scored: Vec<(bool, f64, usize)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.always_salient, overlap_score(&query, &e.text), i))
            .collect();

        // salient desc, score desc, recency desc
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.total_cmp(&a.1))
                .then(b.2.cmp(&a.2))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, _, i)| RetrievedMemory::from(&entries[i]))
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let (json, count) = {
            let entries = self.entries.read().await;
            (serde_json::to_string_pretty(&*entries)?, entries.len())
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::memory(format!("{}: {}", path.display(), e)))?;
        debug!("Flushed {} memories to {}", count, path.display());
        Ok(())
    }
}

/// Jaccard similarity over words longer than three characters.
fn overlap_score(a: &str, b: &str) -> f64 {
    let words = |text: &str| -> HashSet<String> {
        text.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect()
    };
    let wa = words(a);
    let wb = words(b);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    intersection as f64 / union as f64
}

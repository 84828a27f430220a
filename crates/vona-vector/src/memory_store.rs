//! In-memory vector store
//!
//! Brute-force cosine search over an immutable snapshot. Writers build a new
//! snapshot and swap the pointer, so a search always runs against one
//! consistent version. The snapshot can be persisted to a JSON file.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use vona_core::{Result, VonaError};

use crate::embedding::cosine_similarity;
use crate::{EmbeddedDocument, ScoredDocument, VectorStore};

#[derive(Debug, Default)]
struct Snapshot {
    documents: Vec<EmbeddedDocument>,
    positions: HashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot, later duplicates overwrite earlier ones in place
    fn from_documents(documents: Vec<EmbeddedDocument>) -> Self {
        let mut snapshot = Self::default();
        for document in documents {
            snapshot.insert(document);
        }
        snapshot
    }

    fn insert(&mut self, document: EmbeddedDocument) {
        match self.positions.get(document.id()) {
            Some(&pos) => self.documents[pos] = document,
            None => {
                self.positions
                    .insert(document.id().to_string(), self.documents.len());
                self.documents.push(document);
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    documents: Vec<EmbeddedDocument>,
}

/// In-memory vector store with optional file persistence
pub struct MemoryVectorStore {
    snapshot: RwLock<Arc<Snapshot>>,
    path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl MemoryVectorStore {
    /// Create an empty, non-persistent store
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open a store persisted at `path`, loading it when the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedIndex = serde_json::from_slice(&bytes).map_err(|e| {
                    VonaError::DatabaseError(format!(
                        "Corrupt index file {}: {e}",
                        path.display()
                    ))
                })?;
                info!(
                    path = %path.display(),
                    documents = persisted.documents.len(),
                    "Loaded persisted index"
                );
                Snapshot::from_documents(persisted.documents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(VonaError::DatabaseError(format!(
                    "Failed to read index file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            path: Some(path),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Write the current snapshot to disk via a temp file and rename
    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = self.current().await;
        let body = serde_json::to_vec(&PersistedIndex {
            documents: snapshot.documents.clone(),
        })
        .map_err(|e| VonaError::Other(anyhow::anyhow!("Failed to encode index: {e}")))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| {
            VonaError::DatabaseError(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            VonaError::DatabaseError(format!("Failed to replace {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), documents = snapshot.documents.len(), "Index persisted");
        Ok(())
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_all(&self, documents: Vec<EmbeddedDocument>) -> Result<()> {
        let snapshot = Arc::new(Snapshot::from_documents(documents));
        *self.snapshot.write().await = snapshot;
        self.persist().await
    }

    async fn upsert(&self, document: EmbeddedDocument) -> Result<()> {
        {
            let mut guard = self.snapshot.write().await;
            let mut next = Snapshot {
                documents: guard.documents.clone(),
                positions: guard.positions.clone(),
            };
            next.insert(document);
            *guard = Arc::new(next);
        }
        self.persist().await
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<ScoredDocument>> {
        let snapshot = self.current().await;

        let mut scored: Vec<(f32, &EmbeddedDocument)> = snapshot
            .documents
            .iter()
            .map(|doc| (cosine_similarity(query_vector, doc.vector()), doc))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, doc)| doc.scored(score))
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.current().await.documents.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

//! # SemanticMemory
//!
//! Persistent semantic document store for Sibyl.
//!
//! This module composes a [`FlatIndex`] with an ordered metadata store of
//! [`DocumentRecord`]s and owns the alignment invariant between them: index
//! position `i` always corresponds to metadata record `i`, and
//! `records[i].id == i` after every completed mutation. Nothing outside this
//! module mutates either store.
//!
//! ## Persistence
//! Two artifacts live in the data directory and are always written together,
//! each via atomic replace (temp file + rename):
//! - `index.bin` — bincode snapshot of the vector index.
//! - `metadata.json` — JSON array of document records.
//!
//! On startup, a missing index artifact yields a fresh empty store at the
//! embedding provider's dimension. A present index with a metadata artifact
//! that disagrees on count refuses to serve ([`SibylError::Misaligned`])
//! rather than silently truncating.
//!
//! ## Deletion cost
//! The index supports no single-element removal, so `delete_document`
//! removes the metadata record, renumbers the survivors, and rebuilds the
//! index by re-embedding every remaining document in its new order. That is
//! O(n) embedding calls per deletion; the price of guaranteed alignment
//! without a delete-capable index structure.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::SibylError;
use crate::index::FlatIndex;

/// Name of the binary index artifact inside the data directory.
const INDEX_FILE: &str = "index.bin";
/// Name of the JSON metadata artifact inside the data directory.
const METADATA_FILE: &str = "metadata.json";

/// A stored document and its position-derived identity.
///
/// `id` is always equal to the record's index in the metadata store. It is
/// re-derived on every mutation, never independently assigned, which means
/// deleting a document renumbers every record after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: usize,
    pub content: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// The add/search/delete contract the rest of the system consumes.
pub struct SemanticMemory {
    index: FlatIndex,
    records: Vec<DocumentRecord>,
    embedder: Arc<dyn EmbeddingProvider>,
    index_path: PathBuf,
    metadata_path: PathBuf,
}

impl SemanticMemory {
    /// Open the store in `data_dir`, loading persisted artifacts if present.
    ///
    /// # Errors
    /// - [`SibylError::Persistence`] if the directory or artifacts cannot be
    ///   read or the initial empty artifacts cannot be written.
    /// - [`SibylError::Misaligned`] if the index and metadata artifacts hold
    ///   different document counts.
    /// - [`SibylError::Config`] if the persisted index dimension disagrees
    ///   with the embedding provider's.
    pub fn open(
        data_dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, SibylError> {
        fs::create_dir_all(data_dir)?;

        let index_path = data_dir.join(INDEX_FILE);
        let metadata_path = data_dir.join(METADATA_FILE);

        if index_path.exists() {
            let index_bytes = fs::read(&index_path)?;
            let index = FlatIndex::from_bytes(&index_bytes, embedder.dimension())?;

            let metadata_json = fs::read_to_string(&metadata_path)?;
            let records: Vec<DocumentRecord> = serde_json::from_str(&metadata_json)
                .map_err(|e| SibylError::Persistence {
                    source: std::io::Error::other(e),
                })?;

            if index.count() != records.len() {
                return Err(SibylError::Misaligned {
                    vectors: index.count(),
                    records: records.len(),
                });
            }

            info!(documents = records.len(), "loaded semantic memory");

            Ok(Self {
                index,
                records,
                embedder,
                index_path,
                metadata_path,
            })
        } else {
            let memory = Self {
                index: FlatIndex::new(embedder.dimension()),
                records: Vec::new(),
                embedder,
                index_path,
                metadata_path,
            };
            memory.persist()?;
            info!(dir = %data_dir.display(), "initialized empty semantic memory");
            Ok(memory)
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embed `content`, append it to the index and metadata store, persist
    /// both artifacts, and return the new record.
    ///
    /// All-or-nothing from the caller's point of view: if persistence fails,
    /// the in-memory appends are rolled back before the error is returned.
    ///
    /// # Errors
    /// - [`SibylError::Embedding`] if the provider is unavailable or returns
    ///   a wrong-dimension vector.
    /// - [`SibylError::Persistence`] if either artifact cannot be written.
    pub async fn add_document(
        &mut self,
        content: &str,
        source: &str,
    ) -> Result<DocumentRecord, SibylError> {
        let vector = self.embed_checked(content).await?;

        let record = DocumentRecord {
            id: self.records.len(),
            content: content.to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
        };

        self.index.push(vector)?;
        self.records.push(record.clone());

        if let Err(e) = self.persist() {
            self.index.pop();
            self.records.pop();
            return Err(e);
        }

        info!(id = record.id, source = %record.source, "added document");
        Ok(record)
    }

    /// Return up to `k` documents nearest to `query`, best first.
    ///
    /// Ordering is deterministic: ascending squared Euclidean distance with
    /// ties broken by insertion order. An empty store yields an empty vec,
    /// never an error. Fewer than `k` documents yields all of them.
    ///
    /// # Errors
    /// - [`SibylError::InvalidArgument`] if `k == 0`.
    /// - [`SibylError::Embedding`] if the query cannot be embedded.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<DocumentRecord>, SibylError> {
        if k == 0 {
            return Err(SibylError::InvalidArgument(
                "search requires k >= 1".to_string(),
            ));
        }
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed_checked(query).await?;
        let hits = self.index.search(&vector, k)?;

        // Positions are aligned with `records` by invariant; the guard keeps
        // a stale hit from turning into a panic if that ever breaks.
        Ok(hits
            .into_iter()
            .filter_map(|hit| self.records.get(hit.position).cloned())
            .collect())
    }

    /// Remove the document at `id`, renumber the survivors, and rebuild the
    /// index by re-embedding every remaining document in its new order.
    ///
    /// The renumbering is an observable side effect: deleting record 2
    /// changes what was record 5's public id to 4.
    ///
    /// The removal is staged on a copy of the metadata and committed
    /// together with the rebuilt index only after every survivor has been
    /// re-embedded, so a failed rebuild leaves both in-memory stores exactly
    /// as they were. If persistence fails after the commit, the previous
    /// on-disk artifacts remain the recoverable fallback for the next
    /// startup.
    ///
    /// # Errors
    /// - [`SibylError::NotFound`] if `id` is out of range (no state change).
    /// - [`SibylError::Embedding`] / [`SibylError::Persistence`] from the
    ///   rebuild.
    pub async fn delete_document(&mut self, id: usize) -> Result<(), SibylError> {
        if id >= self.records.len() {
            return Err(SibylError::NotFound { id });
        }

        let mut survivors = self.records.clone();
        survivors.remove(id);
        for (position, record) in survivors.iter_mut().enumerate() {
            record.id = position;
        }

        let mut rebuilt = FlatIndex::new(self.index.dimension());
        for record in &survivors {
            let vector = match self.embed_checked(&record.content).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(id = record.id, "rebuild aborted; store left unchanged");
                    return Err(e);
                }
            };
            rebuilt.push(vector)?;
        }

        self.records = survivors;
        self.index = rebuilt;

        self.persist()?;
        info!(id, remaining = self.records.len(), "deleted document and rebuilt index");
        Ok(())
    }

    /// Read-only pagination over the metadata store, in id order.
    pub fn list_documents(&self, skip: usize, limit: usize) -> Vec<DocumentRecord> {
        self.records.iter().skip(skip).take(limit).cloned().collect()
    }

    /// Embed text and enforce the provider's declared dimension.
    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>, SibylError> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.index.dimension() {
            return Err(SibylError::Embedding {
                message: format!(
                    "provider returned a {}-dimension vector, expected {}",
                    vector.len(),
                    self.index.dimension()
                ),
                source: None,
            });
        }
        Ok(vector)
    }

    /// Write both artifacts, each via atomic replace. The index is written
    /// first; a crash between the two writes leaves a pair the next startup
    /// rejects as misaligned rather than a silently corrupt one.
    fn persist(&self) -> Result<(), SibylError> {
        let index_bytes = self.index.to_bytes()?;
        write_atomic(&self.index_path, &index_bytes)?;

        let metadata_json =
            serde_json::to_vec_pretty(&self.records).map_err(|e| SibylError::Persistence {
                source: std::io::Error::other(e),
            })?;
        write_atomic(&self.metadata_path, &metadata_json)?;

        Ok(())
    }
}

/// Write `bytes` to `path` via a temp file in the same directory followed by
/// a rename, so a crash mid-write can never leave a partially written
/// artifact at `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SibylError> {
    let dir = path.parent().ok_or_else(|| SibylError::Persistence {
        source: std::io::Error::other(format!("no parent directory for {}", path.display())),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SibylError::Persistence { source: e.error })?;

    Ok(())
}

//! Per-collection retrieval stores: an HNSW-backed vector index and a flat
//! lexical corpus scored with BM25, merged by reciprocal rank fusion.

pub mod bm25;
pub mod fuse;
pub mod lexical_corpus;
pub mod vector_index;

use point_model::{KnowledgePoint, PointMetadata};

pub use fuse::{reciprocal_rank_fusion, RRF_K};

/// One retrieval hit with the payload captured at indexing time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub content: String,
    /// Absent for hits that only exist in the lexical corpus.
    pub metadata: Option<PointMetadata>,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend disabled")]
    Disabled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Strategy interface for the vector side. The disabled variant turns every
/// operation into a silent no-op, so call sites need no presence checks.
pub trait VectorBackend: Send + Sync {
    /// Insert points with their vectors; `points` and `vectors` are parallel.
    fn add(
        &self,
        collection: &str,
        points: &[KnowledgePoint],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    /// Nearest-neighbor search, best matches first, truncated to `top_k`.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Remove every entry whose metadata references `document_id`.
    fn delete_by_document(&self, collection: &str, document_id: &str)
        -> Result<usize, StoreError>;

    /// Remove specific entries by storage id.
    fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Vector backend used when no client is available (offline mode): adds and
/// deletes succeed as no-ops and queries come back empty.
#[derive(Debug, Default)]
pub struct DisabledVectorBackend;

impl VectorBackend for DisabledVectorBackend {
    fn add(&self, _: &str, _: &[KnowledgePoint], _: &[Vec<f32>]) -> Result<(), StoreError> {
        Ok(())
    }

    fn query(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<ScoredPoint>, StoreError> {
        Ok(Vec::new())
    }

    fn delete_by_document(&self, _: &str, _: &str) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn delete_by_ids(&self, _: &str, _: &[String]) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Strategy interface for the lexical corpus sidecar.
pub trait LexicalBackend: Send + Sync {
    /// Load-concatenate-save under the collection's lock.
    fn append(&self, collection: &str, ids: &[String], texts: &[String])
        -> Result<(), StoreError>;

    /// Parallel `(ids, documents)` lists; empty when the corpus is absent or
    /// unreadable.
    fn load(&self, collection: &str) -> (Vec<String>, Vec<String>);

    /// Drop every entry whose id starts with `prefix` (whole-document
    /// deletion); returns the number removed.
    fn remove_by_id_prefix(&self, collection: &str, prefix: &str) -> Result<usize, StoreError>;

    /// Drop specific entries by id; returns the number removed.
    fn remove_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Lexical backend used when the sidecar is unavailable: loads come back
/// empty and every mutation succeeds as a no-op.
#[derive(Debug, Default)]
pub struct DisabledLexicalBackend;

impl LexicalBackend for DisabledLexicalBackend {
    fn append(&self, _: &str, _: &[String], _: &[String]) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self, _: &str) -> (Vec<String>, Vec<String>) {
        (Vec::new(), Vec::new())
    }

    fn remove_by_id_prefix(&self, _: &str, _: &str) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn remove_by_ids(&self, _: &str, _: &[String]) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

//! Engine facade: knowledge structuring, lockstep dual-index writes and
//! hybrid retrieval with graceful degradation.
//!
//! Ingestion and query failures internal to indexing never surface as errors
//! to callers; they degrade the result set (fewer indexed chunks,
//! vector-only search, empty results) and are visible via logs.

pub mod config;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use embedding_client::embedder::{build_embedder, Embedder, HashEmbedder};
use knowledge_store::bm25::Bm25Model;
use knowledge_store::lexical_corpus::CorpusStore;
use knowledge_store::vector_index::VectorStore;
use knowledge_store::{
    reciprocal_rank_fusion, DisabledLexicalBackend, DisabledVectorBackend, LexicalBackend,
    VectorBackend, RRF_K,
};
use point_model::{DocumentId, KnowledgePoint, PointId};
use text_chunker::ChunkParams;

pub use config::EngineConfig;
pub use knowledge_store::ScoredPoint;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("ingestion canceled")]
    Canceled,
}

/// Cooperative cancellation handle shared across ingestion stages. An
/// in-flight embedding call is not interrupted; the token is checked between
/// pipeline stages.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress events emitted during ingestion.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Start { total_chunks: usize },
    EmbedBatch { done: usize, total: usize },
    IndexVector { total: usize },
    IndexLexical { total: usize },
    Finished { total: usize },
    Canceled,
}

/// Outcome of one ingestion unit.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunk_count: usize,
    pub indexed_vectors: usize,
    pub indexed_lexical: usize,
}

/// Max chunks embedded per endpoint invocation.
const EMBED_BATCH: usize = 64;

pub struct RetrievalService {
    cfg: EngineConfig,
    params: ChunkParams,
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorBackend>,
    lexical: Arc<dyn LexicalBackend>,
}

impl RetrievalService {
    /// Open both stores under `data_dir` and fix the embedding function for
    /// the lifetime of the service. A store that cannot be opened leaves the
    /// engine in degraded (no-op) mode rather than failing construction.
    pub fn new(cfg: EngineConfig, data_dir: &Path) -> Result<Self, ServiceError> {
        let embedder: Arc<dyn Embedder> = match build_embedder(&cfg.embedding_config()) {
            Ok(embedder) => Arc::from(embedder),
            Err(err) => {
                log::warn!(
                    "embedding endpoint misconfigured, using backend-default embedding: {err}"
                );
                Arc::new(HashEmbedder::default())
            }
        };
        let vector: Arc<dyn VectorBackend> = match VectorStore::open(data_dir.join("vector")) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                log::warn!("vector backend unavailable, running in degraded mode: {err}");
                Arc::new(DisabledVectorBackend)
            }
        };
        let lexical: Arc<dyn LexicalBackend> = match CorpusStore::open(data_dir.join("corpus")) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                log::warn!("lexical corpus unavailable, hybrid ranking disabled: {err}");
                Arc::new(DisabledLexicalBackend)
            }
        };
        Self::with_backends(cfg, embedder, vector, lexical)
    }

    /// Assemble a service from explicit backend strategies; used for
    /// degraded-mode deployments and tests.
    pub fn with_backends(
        cfg: EngineConfig,
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorBackend>,
        lexical: Arc<dyn LexicalBackend>,
    ) -> Result<Self, ServiceError> {
        let params = cfg.chunk_params();
        params.validate().map_err(|err| ServiceError::Config(err.to_string()))?;
        Ok(Self { cfg, params, embedder, vector, lexical })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Structure a cleaned document into ordered knowledge points with
    /// contiguous chunk indices from zero.
    pub fn structure_document(&self, text: &str, document_id: &DocumentId) -> Vec<KnowledgePoint> {
        match text_chunker::structure_document(text, document_id, &self.params) {
            Ok(points) => points,
            // Params are validated at construction, so this only fires if the
            // chunker rejects them anyway; ingest nothing in that case.
            Err(err) => {
                log::warn!("structuring document `{document_id}` failed: {err}");
                Vec::new()
            }
        }
    }

    /// Index knowledge points into the collection's vector partition and
    /// lexical corpus. Best-effort on both sides: a failed write degrades to
    /// fewer indexed chunks and never fails the caller's flow. This is also
    /// the opt-in path for manually created points.
    ///
    /// A disabled vector backend makes this a full no-op, keeping search
    /// output empty in offline mode.
    pub fn add_to_vector_store(&self, points: &[KnowledgePoint], collection: &str) {
        if points.is_empty() || !self.vector.is_enabled() {
            return;
        }
        let texts: Vec<&str> = points.iter().map(|p| p.content.as_str()).collect();
        let vectors = self.embedder.embed_silent(&texts);
        self.index_points(points, &vectors, collection);
    }

    fn index_points(
        &self,
        points: &[KnowledgePoint],
        vectors: &[Vec<f32>],
        collection: &str,
    ) -> (usize, usize) {
        let mut indexed_vectors = 0usize;
        if !vectors.is_empty() {
            if vectors.len() < points.len() {
                log::warn!(
                    "embedding returned {} vectors for {} chunks, indexing the prefix",
                    vectors.len(),
                    points.len()
                );
            }
            let n = points.len().min(vectors.len());
            match self.vector.add(collection, &points[..n], &vectors[..n]) {
                Ok(()) => indexed_vectors = n,
                Err(err) => log::warn!("vector index write for `{collection}` failed: {err}"),
            }
        }

        // The corpus does not need embeddings, so it still gets every chunk
        // when the embedding call came back short.
        let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
        let texts: Vec<String> = points.iter().map(|p| p.content.clone()).collect();
        let indexed_lexical = match self.lexical.append(collection, &ids, &texts) {
            Ok(()) => ids.len(),
            Err(err) => {
                log::warn!("lexical corpus append for `{collection}` failed: {err}");
                0
            }
        };
        (indexed_vectors, indexed_lexical)
    }

    /// Remove a document's points from both stores. Best-effort: a failure
    /// on either side is logged and leaves the other side cleaned.
    pub fn delete_document(&self, document_id: &DocumentId, collection: &str) {
        if let Err(err) = self.vector.delete_by_document(collection, document_id.as_str()) {
            log::warn!("vector delete for document `{document_id}` failed: {err}");
        }
        let prefix = PointId::document_prefix(document_id);
        if let Err(err) = self.lexical.remove_by_id_prefix(collection, &prefix) {
            log::warn!("lexical delete for document `{document_id}` failed: {err}");
        }
    }

    /// Remove a specific set of a document's chunks from both stores.
    pub fn delete_chunks(&self, document_id: &DocumentId, chunk_indices: &[u32], collection: &str) {
        if chunk_indices.is_empty() {
            return;
        }
        let ids: Vec<String> = chunk_indices
            .iter()
            .map(|&i| PointId::new(document_id.clone(), i).to_string())
            .collect();
        if let Err(err) = self.vector.delete_by_ids(collection, &ids) {
            log::warn!("vector chunk delete for `{document_id}` failed: {err}");
        }
        if let Err(err) = self.lexical.remove_by_ids(collection, &ids) {
            log::warn!("lexical chunk delete for `{document_id}` failed: {err}");
        }
    }

    /// Hybrid similarity search, stateless per call.
    ///
    /// The vector side runs first; with hybrid ranking enabled and a
    /// non-empty corpus, a BM25 model is rebuilt over the entire corpus and
    /// both lists merge via reciprocal rank fusion. Any failed sub-query
    /// degrades the result set instead of raising.
    pub fn search_similar(
        &self,
        query: &str,
        collection: &str,
        n_results: usize,
    ) -> Vec<ScoredPoint> {
        if n_results == 0 || !self.vector.is_enabled() {
            return Vec::new();
        }
        let hybrid = self.cfg.use_hybrid && self.lexical.is_enabled();
        let fetch_k = if hybrid { (n_results * 2).max(10) } else { n_results };

        let query_vectors = self.embedder.embed_silent(&[query]);
        let mut vector_hits = match query_vectors.first() {
            Some(vector) => match self.vector.query(collection, vector, fetch_k) {
                Ok(hits) => hits,
                Err(err) => {
                    log::warn!("vector query on `{collection}` failed, degrading: {err}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if !hybrid {
            vector_hits.truncate(n_results);
            return vector_hits;
        }

        let (ids, documents) = self.lexical.load(collection);
        if ids.is_empty() {
            vector_hits.truncate(n_results);
            return vector_hits;
        }

        // Rebuilt fresh on every query; the corpus file may have changed
        // underneath us since the last call.
        let model = Bm25Model::fit(&documents);
        let lexical_hits: Vec<ScoredPoint> = model
            .rank(query, fetch_k)
            .into_iter()
            .map(|(doc, score)| ScoredPoint {
                id: ids[doc].clone(),
                content: documents[doc].clone(),
                metadata: None,
                score: score as f32,
            })
            .collect();

        let mut merged = reciprocal_rank_fusion(vector_hits, lexical_hits, RRF_K);
        merged.truncate(n_results);
        merged
    }

    /// Search with the configured default result count.
    pub fn search(&self, query: &str, collection: &str) -> Vec<ScoredPoint> {
        self.search_similar(query, collection, self.cfg.context_window)
    }

    /// One ingestion unit: chunk, embed in bounded batches, then index both
    /// stores. Cancellation is checked between stages; a failed embedding
    /// batch stops the embedding stage and the indexed prefix still lands.
    pub fn process_document(
        &self,
        text: &str,
        document_id: &DocumentId,
        collection: &str,
        cancel: Option<&CancelToken>,
        mut progress: Option<Box<dyn FnMut(ProgressEvent) + Send>>,
    ) -> Result<IngestReport, ServiceError> {
        let points = self.structure_document(text, document_id);
        if let Some(cb) = progress.as_deref_mut() {
            cb(ProgressEvent::Start { total_chunks: points.len() });
        }
        if points.is_empty() {
            if let Some(cb) = progress.as_deref_mut() {
                cb(ProgressEvent::Finished { total: 0 });
            }
            return Ok(IngestReport {
                document_id: document_id.clone(),
                chunk_count: 0,
                indexed_vectors: 0,
                indexed_lexical: 0,
            });
        }

        let (indexed_vectors, indexed_lexical) = if self.vector.is_enabled() {
            let texts: Vec<&str> = points.iter().map(|p| p.content.as_str()).collect();
            let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(points.len());
            for batch in texts.chunks(EMBED_BATCH) {
                if let Some(ct) = cancel {
                    if ct.is_canceled() {
                        if let Some(cb) = progress.as_deref_mut() {
                            cb(ProgressEvent::Canceled);
                        }
                        return Err(ServiceError::Canceled);
                    }
                }
                let got = self.embedder.embed_silent(batch);
                let short = got.len() < batch.len();
                vectors.extend(got);
                if let Some(cb) = progress.as_deref_mut() {
                    cb(ProgressEvent::EmbedBatch { done: vectors.len(), total: texts.len() });
                }
                if short {
                    break;
                }
            }

            let counts = self.index_points(&points, &vectors, collection);
            if let Some(cb) = progress.as_deref_mut() {
                cb(ProgressEvent::IndexVector { total: counts.0 });
            }
            if let Some(cb) = progress.as_deref_mut() {
                cb(ProgressEvent::IndexLexical { total: counts.1 });
            }
            counts
        } else {
            (0, 0)
        };

        if let Some(cb) = progress.as_deref_mut() {
            cb(ProgressEvent::Finished { total: points.len() });
        }
        Ok(IngestReport {
            document_id: document_id.clone(),
            chunk_count: points.len(),
            indexed_vectors,
            indexed_lexical,
        })
    }

    /// Run one ingestion unit on a background worker thread, one per
    /// uploaded document. Concurrent documents into the same collection
    /// serialize only at the per-collection corpus lock.
    pub fn spawn_ingest(
        self: Arc<Self>,
        text: String,
        document_id: DocumentId,
        collection: String,
        cancel: Option<CancelToken>,
        progress: Option<Box<dyn FnMut(ProgressEvent) + Send>>,
    ) -> thread::JoinHandle<Result<IngestReport, ServiceError>> {
        thread::spawn(move || {
            self.process_document(&text, &document_id, &collection, cancel.as_ref(), progress)
        })
    }
}

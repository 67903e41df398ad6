//! HNSW-backed vector index, one partition per collection.
//!
//! Cosine distance; persists by snapshotting vectors plus payloads and
//! rebuilding the graph on load. HNSW has no true delete, so removals are
//! tombstones filtered at query time and compacted away on the next load.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use hnsw_rs::prelude::*;
use point_model::{sanitize_collection, KnowledgePoint, PointMetadata};
use serde::{Deserialize, Serialize};

use crate::{ScoredPoint, StoreError, VectorBackend};

const POINTS_FILE: &str = "points.json";
const VECTORS_FILE: &str = "vectors.bin";

/// Per-point payload persisted next to its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    id: String,
    content: String,
    metadata: PointMetadata,
    #[serde(default)]
    deleted: bool,
}

/// One collection's resident index: graph, parallel payload/vector rows and
/// the tombstone set.
struct CollectionIndex {
    /// Zero until the first vector arrives; snapshots fix it on load.
    dim: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    id_map: HashMap<String, usize>,
    points: Vec<StoredPoint>,
    vectors: Vec<Vec<f32>>,
    tombstones: HashSet<usize>,
}

impl CollectionIndex {
    fn new() -> Self {
        Self {
            dim: 0,
            hnsw: None,
            id_map: HashMap::new(),
            points: Vec::new(),
            vectors: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    fn build_graph(expected: usize) -> Hnsw<'static, f32, DistCosine> {
        let max_nb_conn = 16;
        let ef_c = 200;
        let num_layers = 16;
        Hnsw::<f32, DistCosine>::new(max_nb_conn, expected.max(1_000), num_layers, ef_c, DistCosine {})
    }

    fn insert(&mut self, point: &KnowledgePoint, vector: &[f32]) {
        if vector.is_empty() {
            return;
        }
        if self.dim == 0 {
            self.dim = vector.len();
            self.hnsw = Some(Self::build_graph(10_000));
        }
        if vector.len() != self.dim {
            log::warn!(
                "skipping `{}`: vector dimension {} does not match index dimension {}",
                point.id,
                vector.len(),
                self.dim
            );
            return;
        }

        let id = point.id.to_string();
        let label = match self.id_map.get(&id) {
            // Re-add replaces payload and vector by reinsert; stale graph
            // edges persist until the next snapshot load rebuilds the graph.
            Some(&label) => {
                self.vectors[label] = vector.to_vec();
                self.points[label] = StoredPoint {
                    id,
                    content: point.content.clone(),
                    metadata: point.metadata(),
                    deleted: false,
                };
                self.tombstones.remove(&label);
                label
            }
            None => {
                let label = self.points.len();
                self.id_map.insert(id.clone(), label);
                self.points.push(StoredPoint {
                    id,
                    content: point.content.clone(),
                    metadata: point.metadata(),
                    deleted: false,
                });
                self.vectors.push(vector.to_vec());
                label
            }
        };
        if let Some(hnsw) = &self.hnsw {
            let _ = hnsw.insert((&self.vectors[label][..], label));
        }
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Vec<ScoredPoint> {
        let Some(hnsw) = &self.hnsw else { return Vec::new() };
        if vector.len() != self.dim || top_k == 0 {
            return Vec::new();
        }
        let ef_s = (top_k * 10).max(top_k);
        let knn = hnsw.search(vector, (top_k * 5).max(top_k), ef_s);
        let mut out = Vec::new();
        for el in knn {
            let label = el.d_id;
            if self.tombstones.contains(&label) {
                continue;
            }
            let point = &self.points[label];
            // Cosine distance: smaller is better, flip into a similarity.
            let score = 1.0f32 - el.distance as f32;
            out.push(ScoredPoint {
                id: point.id.clone(),
                content: point.content.clone(),
                metadata: Some(point.metadata.clone()),
                score,
            });
            if out.len() >= top_k {
                break;
            }
        }
        out
    }

    fn tombstone(&mut self, label: usize) {
        self.points[label].deleted = true;
        self.tombstones.insert(label);
    }

    /// Snapshot payloads + vectors to `dir` via temp files and rename.
    fn save(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir)?;
        let points_tmp = dir.join(format!("{POINTS_FILE}.tmp"));
        let vectors_tmp = dir.join(format!("{VECTORS_FILE}.tmp"));

        let payload = serde_json::to_vec(&self.points)
            .map_err(|err| StoreError::Backend(format!("snapshot serialization failed: {err}")))?;
        fs::write(&points_tmp, payload)?;

        {
            use std::io::Write;
            let mut w = fs::File::create(&vectors_tmp)?;
            // binary: [u32 dim][f32..] repeated
            for v in &self.vectors {
                let dim = v.len() as u32;
                w.write_all(&dim.to_le_bytes())?;
                let bytes: &[u8] = bytemuck::cast_slice(&v[..]);
                w.write_all(bytes)?;
            }
        }

        fs::rename(points_tmp, dir.join(POINTS_FILE))?;
        fs::rename(vectors_tmp, dir.join(VECTORS_FILE))?;
        Ok(())
    }

    /// Load a snapshot, drop tombstoned rows and rebuild the graph.
    fn load(dir: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(dir.join(POINTS_FILE))?;
        let rows: Vec<StoredPoint> = serde_json::from_str(&raw)
            .map_err(|err| StoreError::Corrupt(format!("points snapshot: {err}")))?;

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(rows.len());
        {
            use std::io::Read;
            let mut r = std::io::BufReader::new(fs::File::open(dir.join(VECTORS_FILE))?);
            loop {
                let mut len_buf = [0u8; 4];
                if r.read_exact(&mut len_buf).is_err() {
                    break;
                }
                let l = u32::from_le_bytes(len_buf) as usize;
                let mut vbytes = vec![0u8; 4 * l];
                r.read_exact(&mut vbytes)
                    .map_err(|err| StoreError::Corrupt(format!("vectors snapshot: {err}")))?;
                vectors.push(bytemuck::cast_slice(&vbytes).to_vec());
            }
        }
        if vectors.len() != rows.len() {
            return Err(StoreError::Corrupt(format!(
                "snapshot holds {} payload rows but {} vectors",
                rows.len(),
                vectors.len()
            )));
        }

        let mut index = Self::new();
        for (row, vector) in rows.into_iter().zip(vectors) {
            if row.deleted {
                continue;
            }
            if index.dim == 0 {
                index.dim = vector.len();
                index.hnsw = Some(Self::build_graph(index.id_map.len().max(10_000)));
            }
            if vector.len() != index.dim {
                return Err(StoreError::Corrupt(format!(
                    "vector for `{}` has dimension {}, index has {}",
                    row.id,
                    vector.len(),
                    index.dim
                )));
            }
            let label = index.points.len();
            index.id_map.insert(row.id.clone(), label);
            index.points.push(row);
            index.vectors.push(vector);
            if let Some(hnsw) = &index.hnsw {
                let _ = hnsw.insert((&index.vectors[label][..], label));
            }
        }
        Ok(index)
    }
}

/// Persistent vector store rooted at one directory, one partition
/// subdirectory per collection. Partitions load lazily and stay resident.
pub struct VectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<Mutex<CollectionIndex>>>>,
}

impl VectorStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, collections: RwLock::new(HashMap::new()) })
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(sanitize_collection(collection))
    }

    fn handle(&self, collection: &str) -> Result<Arc<Mutex<CollectionIndex>>, StoreError> {
        let key = sanitize_collection(collection);
        if let Ok(map) = self.collections.read() {
            if let Some(handle) = map.get(&key) {
                return Ok(handle.clone());
            }
        }

        let dir = self.root.join(&key);
        let index = if dir.join(POINTS_FILE).exists() {
            match CollectionIndex::load(&dir) {
                Ok(index) => index,
                Err(err) => {
                    log::warn!(
                        "vector snapshot for `{collection}` is unreadable, starting empty: {err}"
                    );
                    CollectionIndex::new()
                }
            }
        } else {
            CollectionIndex::new()
        };

        let mut map = self
            .collections
            .write()
            .map_err(|_| StoreError::Backend("vector store lock poisoned".into()))?;
        Ok(map.entry(key).or_insert_with(|| Arc::new(Mutex::new(index))).clone())
    }

    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut CollectionIndex) -> R,
    ) -> Result<R, StoreError> {
        let handle = self.handle(collection)?;
        let mut index = handle
            .lock()
            .map_err(|_| StoreError::Backend("vector collection lock poisoned".into()))?;
        Ok(f(&mut index))
    }
}

impl VectorBackend for VectorStore {
    fn add(
        &self,
        collection: &str,
        points: &[KnowledgePoint],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        if points.is_empty() || vectors.is_empty() {
            return Ok(());
        }
        let n = points.len().min(vectors.len());
        let dir = self.collection_dir(collection);
        self.with_collection(collection, |index| {
            for (point, vector) in points[..n].iter().zip(&vectors[..n]) {
                index.insert(point, vector);
            }
            index.save(&dir)
        })?
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.with_collection(collection, |index| index.query(vector, top_k))
    }

    fn delete_by_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<usize, StoreError> {
        let dir = self.collection_dir(collection);
        self.with_collection(collection, |index| {
            let mut removed = 0usize;
            for label in 0..index.points.len() {
                if !index.points[label].deleted
                    && index.points[label].metadata.document_id == document_id
                {
                    index.tombstone(label);
                    removed += 1;
                }
            }
            if removed > 0 {
                index.save(&dir)?;
            }
            Ok(removed)
        })?
    }

    fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let dir = self.collection_dir(collection);
        self.with_collection(collection, |index| {
            let mut removed = 0usize;
            for id in ids {
                if let Some(&label) = index.id_map.get(id) {
                    if !index.points[label].deleted {
                        index.tombstone(label);
                        removed += 1;
                    }
                }
            }
            if removed > 0 {
                index.save(&dir)?;
            }
            Ok(removed)
        })?
    }
}

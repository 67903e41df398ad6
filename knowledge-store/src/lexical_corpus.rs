//! Flat per-collection lexical corpus sidecar.
//!
//! One JSON blob per collection holding parallel `ids`/`documents` arrays.
//! Every mutation is a full load-mutate-save cycle guarded by a
//! per-collection mutex, so in-process writers cannot lose each other's
//! updates. Cross-process writers remain last-writer-wins.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use point_model::sanitize_collection;
use serde::{Deserialize, Serialize};

use crate::{LexicalBackend, StoreError};

/// On-disk shape of one collection's corpus.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CorpusFile {
    ids: Vec<String>,
    documents: Vec<String>,
}

pub struct CorpusStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CorpusStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, locks: Mutex::new(HashMap::new()) })
    }

    /// Corpus file for a collection, keyed by its sanitized name.
    pub fn corpus_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_collection(collection)))
    }

    fn lock_for(&self, collection: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(sanitize_collection(collection)).or_default().clone()
    }

    fn read(&self, collection: &str) -> (Vec<String>, Vec<String>) {
        let path = self.corpus_path(collection);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            // Not created yet, or unreadable: either way the corpus is empty.
            Err(_) => return (Vec::new(), Vec::new()),
        };
        match serde_json::from_str::<CorpusFile>(&raw) {
            Ok(file) if file.ids.len() == file.documents.len() => (file.ids, file.documents),
            Ok(_) => {
                log::warn!(
                    "corpus `{}` has mismatched id/document lengths, treating as empty",
                    path.display()
                );
                (Vec::new(), Vec::new())
            }
            Err(err) => {
                log::warn!("corpus `{}` is unreadable, treating as empty: {err}", path.display());
                (Vec::new(), Vec::new())
            }
        }
    }

    /// Overwrite the collection's corpus with the full serialized state.
    pub fn save(
        &self,
        collection: &str,
        ids: Vec<String>,
        documents: Vec<String>,
    ) -> Result<(), StoreError> {
        let path = self.corpus_path(collection);
        let payload = serde_json::to_vec(&CorpusFile { ids, documents })
            .map_err(|err| StoreError::Backend(format!("corpus serialization failed: {err}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl LexicalBackend for CorpusStore {
    fn append(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let n = ids.len().min(texts.len());
        if ids.len() != texts.len() {
            log::warn!(
                "corpus append for `{collection}` got {} ids and {} texts, keeping {n}",
                ids.len(),
                texts.len()
            );
        }
        let guard = self.lock_for(collection);
        let _held = guard.lock().map_err(|_| StoreError::Backend("corpus lock poisoned".into()))?;
        let (mut cur_ids, mut cur_docs) = self.read(collection);
        cur_ids.extend_from_slice(&ids[..n]);
        cur_docs.extend_from_slice(&texts[..n]);
        self.save(collection, cur_ids, cur_docs)
    }

    fn load(&self, collection: &str) -> (Vec<String>, Vec<String>) {
        self.read(collection)
    }

    fn remove_by_id_prefix(&self, collection: &str, prefix: &str) -> Result<usize, StoreError> {
        let guard = self.lock_for(collection);
        let _held = guard.lock().map_err(|_| StoreError::Backend("corpus lock poisoned".into()))?;
        let (ids, docs) = self.read(collection);
        let mut kept_ids = Vec::with_capacity(ids.len());
        let mut kept_docs = Vec::with_capacity(docs.len());
        let mut removed = 0usize;
        for (id, doc) in ids.into_iter().zip(docs) {
            if id.starts_with(prefix) {
                removed += 1;
            } else {
                kept_ids.push(id);
                kept_docs.push(doc);
            }
        }
        if removed > 0 {
            self.save(collection, kept_ids, kept_docs)?;
        }
        Ok(removed)
    }

    fn remove_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let guard = self.lock_for(collection);
        let _held = guard.lock().map_err(|_| StoreError::Backend("corpus lock poisoned".into()))?;
        let (cur_ids, cur_docs) = self.read(collection);
        let mut kept_ids = Vec::with_capacity(cur_ids.len());
        let mut kept_docs = Vec::with_capacity(cur_docs.len());
        let mut removed = 0usize;
        for (id, doc) in cur_ids.into_iter().zip(cur_docs) {
            if targets.contains(id.as_str()) {
                removed += 1;
            } else {
                kept_ids.push(id);
                kept_docs.push(doc);
            }
        }
        if removed > 0 {
            self.save(collection, kept_ids, kept_docs)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_corpus_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        let (ids, docs) = store.load("nothing_here");
        assert!(ids.is_empty());
        assert!(docs.is_empty());
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();

        store.append("col", &strings(&["1_chunk_0", "1_chunk_1"]), &strings(&["aa", "bb"])).unwrap();
        store.append("col", &strings(&["2_chunk_0"]), &strings(&["cc"])).unwrap();

        let (ids, docs) = store.load("col");
        assert_eq!(ids, strings(&["1_chunk_0", "1_chunk_1", "2_chunk_0"]));
        assert_eq!(docs, strings(&["aa", "bb", "cc"]));
    }

    #[test]
    fn corrupt_corpus_loads_empty_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        fs::write(store.corpus_path("broken"), b"{not valid json").unwrap();

        let (ids, docs) = store.load("broken");
        assert!(ids.is_empty());
        assert!(docs.is_empty());
    }

    #[test]
    fn mismatched_parallel_arrays_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        fs::write(
            store.corpus_path("skewed"),
            br#"{"ids":["a","b"],"documents":["only one"]}"#,
        )
        .unwrap();

        let (ids, docs) = store.load("skewed");
        assert!(ids.is_empty());
        assert!(docs.is_empty());
    }

    #[test]
    fn remove_by_id_prefix_drops_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        store
            .append(
                "col",
                &strings(&["7_chunk_0", "7_chunk_1", "8_chunk_0", "77_chunk_0"]),
                &strings(&["a", "b", "c", "d"]),
            )
            .unwrap();

        let removed = store.remove_by_id_prefix("col", "7_chunk_").unwrap();
        assert_eq!(removed, 2);

        let (ids, _) = store.load("col");
        assert_eq!(ids, strings(&["8_chunk_0", "77_chunk_0"]));
    }

    #[test]
    fn remove_by_ids_targets_exact_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        store
            .append("col", &strings(&["d_chunk_0", "d_chunk_1", "d_chunk_2"]), &strings(&["a", "b", "c"]))
            .unwrap();

        let removed = store.remove_by_ids("col", &strings(&["d_chunk_1", "absent"])).unwrap();
        assert_eq!(removed, 1);

        let (ids, docs) = store.load("col");
        assert_eq!(ids, strings(&["d_chunk_0", "d_chunk_2"]));
        assert_eq!(docs, strings(&["a", "c"]));
    }

    #[test]
    fn collections_are_isolated_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(dir.path()).unwrap();
        store.append("alpha", &strings(&["x"]), &strings(&["1"])).unwrap();
        store.append("beta", &strings(&["y"]), &strings(&["2"])).unwrap();

        let (alpha_ids, _) = store.load("alpha");
        let (beta_ids, _) = store.load("beta");
        assert_eq!(alpha_ids, strings(&["x"]));
        assert_eq!(beta_ids, strings(&["y"]));
        assert_ne!(store.corpus_path("alpha"), store.corpus_path("beta"));
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CorpusStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for writer in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..10 {
                    let id = format!("w{writer}_chunk_{i}");
                    store.append("shared", &[id.clone()], &[format!("text {id}")]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // The per-collection lock makes every load-mutate-save atomic in
        // process: no writer overwrites another's additions.
        let (ids, docs) = store.load("shared");
        assert_eq!(ids.len(), 80);
        assert_eq!(docs.len(), 80);
    }
}

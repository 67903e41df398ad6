//! Engine configuration surface.

use std::fs;
use std::path::Path;

use embedding_client::config::RemoteEmbeddingConfig;
use serde::{Deserialize, Serialize};
use text_chunker::ChunkParams;

/// Recognized engine options, serialized with the camelCase wire keys the
/// desktop client writes. Unknown keys are ignored on load; missing keys
/// take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub chunk_size: usize,
    /// Default number of results handed to chat/annotation callers.
    pub context_window: usize,
    pub use_hybrid: bool,
    /// Empty selects the backend-default (deterministic hash) embedding.
    pub embedding_model: String,
    /// Empty selects the default OpenAI endpoint.
    pub embedding_base_url: String,
    /// Resolved by the caller before construction; never persisted in clear
    /// text by this crate's `save`.
    #[serde(skip_serializing)]
    pub embedding_api_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            context_window: 5,
            use_hybrid: true,
            embedding_model: String::new(),
            embedding_base_url: String::new(),
            embedding_api_key: String::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. A missing, unreadable or malformed file yields
    /// the defaults; recognized keys in a valid file override them.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(err) => {
                    log::warn!("config `{}` is unreadable, using defaults: {err}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let payload = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        fs::write(path, payload)
    }

    /// Chunking window derived from `chunk_size` with the default overlap.
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::new(self.chunk_size)
    }

    pub fn embedding_config(&self) -> RemoteEmbeddingConfig {
        let mut config = RemoteEmbeddingConfig::new(self.embedding_model.clone());
        config.base_url = self.embedding_base_url.clone();
        config.api_key = self.embedding_api_key.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_recognized_surface() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.context_window, 5);
        assert!(cfg.use_hybrid);
        assert!(cfg.embedding_model.is_empty());
        assert!(cfg.embedding_base_url.is_empty());
        assert!(cfg.embedding_api_key.is_empty());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(&dir.path().join("nope.json"));
        assert_eq!(cfg.chunk_size, 500);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag_config.json");
        fs::write(&path, r#"{"chunkSize": 800, "useHybrid": false, "unknownKey": 1}"#).unwrap();

        let cfg = EngineConfig::load(&path);
        assert_eq!(cfg.chunk_size, 800);
        assert!(!cfg.use_hybrid);
        assert_eq!(cfg.context_window, 5);
    }

    #[test]
    fn malformed_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag_config.json");
        fs::write(&path, "{broken").unwrap();
        let cfg = EngineConfig::load(&path);
        assert_eq!(cfg.chunk_size, 500);
    }

    #[test]
    fn save_round_trips_without_the_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rag_config.json");

        let mut cfg = EngineConfig::default();
        cfg.chunk_size = 640;
        cfg.embedding_model = "text-embedding-3-small".into();
        cfg.embedding_api_key = "secret".into();
        cfg.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("chunkSize"));
        assert!(!raw.contains("secret"));

        let loaded = EngineConfig::load(&path);
        assert_eq!(loaded.chunk_size, 640);
        assert_eq!(loaded.embedding_model, "text-embedding-3-small");
        assert!(loaded.embedding_api_key.is_empty());
    }

    #[test]
    fn chunk_params_derive_overlap_from_chunk_size() {
        let cfg = EngineConfig::default();
        let params = cfg.chunk_params();
        assert_eq!(params.target_size, 500);
        assert_eq!(params.overlap, 100);
    }
}

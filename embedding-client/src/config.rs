use std::time::Duration;

/// Default settings for the remote embeddings endpoint.
#[derive(Debug, Clone, Copy)]
pub struct RemoteDefaults {
    pub base_url: &'static str,
    pub request_timeout_secs: u64,
}

/// Shared defaults so the service, demo tool and tests stay in sync.
pub const REMOTE_DEFAULTS: RemoteDefaults = RemoteDefaults {
    base_url: "https://api.openai.com/v1",
    request_timeout_secs: 30,
};

/// Configuration for an OpenAI-compatible embeddings endpoint.
///
/// An empty `base_url` falls back to the default endpoint; an empty
/// `api_key` sends no Authorization header (local/proxy deployments).
#[derive(Debug, Clone)]
pub struct RemoteEmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl RemoteEmbeddingConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: String::new(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(REMOTE_DEFAULTS.request_timeout_secs),
        }
    }
}

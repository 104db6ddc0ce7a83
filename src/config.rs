use serde::Deserialize;

use crate::services::encoder::DroppedRatingPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// ONNX export of the recommender model
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// JSON array of item ids, position = corpus index
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,

    /// Optional metadata CSV (`id`, `rating_count`) used for niche boosting
    #[serde(default)]
    pub metadata_path: Option<String>,

    /// Number of items the model was trained on
    #[serde(default = "default_corpus_size")]
    pub corpus_size: usize,

    /// Maximum number of cached responses
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    /// Shards used for batched holdout inference; defaults to the rayon pool size
    #[serde(default)]
    pub inference_shards: Option<usize>,

    /// How "dropped" entries are mapped onto the dropped-rating sentinel
    #[serde(default)]
    pub dropped_rating_policy: DroppedRatingPolicy,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_model_path() -> String {
    "/opt/model/model.onnx".to_string()
}

fn default_corpus_path() -> String {
    "/opt/model/corpus_ids.json".to_string()
}

fn default_corpus_size() -> usize {
    6000
}

fn default_cache_max_size() -> usize {
    500
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_iter(std::env::vars())
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        Self::validate(config)
    }

    /// Load configuration from an explicit set of key/value pairs
    pub fn from_iter<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        Self::validate(config)
    }

    fn validate(config: Config) -> anyhow::Result<Self> {
        if config.corpus_size == 0 {
            anyhow::bail!("CORPUS_SIZE must be greater than zero");
        }
        if config.cache_max_size == 0 {
            anyhow::bail!("CACHE_MAX_SIZE must be greater than zero");
        }
        if config.inference_shards == Some(0) {
            anyhow::bail!("INFERENCE_SHARDS must be greater than zero");
        }
        Ok(config)
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

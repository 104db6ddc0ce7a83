use std::sync::Arc;

use crate::{
    cache::ResponseCache,
    config::Config,
    error::AppResult,
    model::{BatchExecutor, OnnxRecommender, Recommender},
    models::{Corpus, PopularityDistribution},
    services::{DroppedRatingPolicy, RecommendationEngine, RecommendationService},
};

/// Tunables for the recommendation service
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub cache_max_size: usize,
    pub inference_shards: usize,
    pub dropped_rating_policy: DroppedRatingPolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            cache_max_size: 500,
            inference_shards: rayon::current_num_threads(),
            dropped_rating_policy: DroppedRatingPolicy::default(),
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_max_size: config.cache_max_size,
            inference_shards: config
                .inference_shards
                .unwrap_or_else(rayon::current_num_threads),
            dropped_rating_policy: config.dropped_rating_policy,
        }
    }
}

/// Shared application state
///
/// Built once at startup; everything inside is read-only or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub recommendations: RecommendationService,
}

impl AppState {
    /// Assembles the state around an already loaded model
    pub fn new(
        corpus: Corpus,
        popularity: Option<PopularityDistribution>,
        model: Arc<dyn Recommender>,
        options: ServiceOptions,
    ) -> AppResult<Self> {
        let executor = BatchExecutor::new(model, options.inference_shards);
        let engine = RecommendationEngine::new(
            executor,
            Arc::new(corpus),
            popularity.map(Arc::new),
        )?;
        let cache = ResponseCache::new(options.cache_max_size);
        let recommendations =
            RecommendationService::new(engine, cache, options.dropped_rating_policy)?;

        Ok(Self { recommendations })
    }

    /// Loads the corpus, metadata and ONNX model named by `config`
    pub fn load(config: &Config) -> AppResult<Self> {
        let corpus = Corpus::load(&config.corpus_path, config.corpus_size)?;

        let popularity = match &config.metadata_path {
            Some(path) => PopularityDistribution::load(path, &corpus)?,
            None => {
                tracing::warn!("METADATA_PATH not set, niche boost will be disabled");
                None
            }
        };

        let model = OnnxRecommender::load(&config.model_path, config.corpus_size)?;
        let options = ServiceOptions::from_config(config);

        tracing::info!(
            corpus_size = corpus.len(),
            cache_max_size = options.cache_max_size,
            inference_shards = options.inference_shards,
            dropped_rating_policy = ?options.dropped_rating_policy,
            niche_boost = popularity.is_some(),
            "Recommendation service ready"
        );

        Self::new(corpus, popularity, Arc::new(model), options)
    }
}

use serde::{Deserialize, Serialize};

pub mod corpus;
pub mod popularity;

pub use corpus::{Corpus, ItemId};
pub use popularity::PopularityDistribution;

/// Default number of recommendations returned
pub const DEFAULT_TOP_K: usize = 50;

/// Default number of contributors attached to each recommendation
pub const DEFAULT_TOP_CONTRIBUTORS: usize = 3;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_top_contributors() -> usize {
    DEFAULT_TOP_CONTRIBUTORS
}

// ============================================================================
// Request Types
// ============================================================================

/// One item from the user's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub item_id: ItemId,
    /// 0-10 scale, 0 means unrated, -2 means dropped without a rating
    #[serde(default)]
    pub rating: f32,
    /// "completed", "watching", "dropped", "plan_to_watch", ...
    #[serde(default)]
    pub watch_status: String,
}

/// Body of `POST /recommend`
///
/// Every optional field carries a named default so that two requests which differ
/// only in omitted-vs-explicit defaults serialize to the same cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub profile: Vec<ProfileEntry>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub logit_weight: Option<f32>,
    #[serde(default)]
    pub include_profile_holdout: bool,
    #[serde(default)]
    pub include_contribution_analysis: bool,
    #[serde(default = "default_top_contributors")]
    pub top_contributors: usize,
    #[serde(default)]
    pub use_alt_ranking: bool,
    #[serde(default)]
    pub niche_boost_factor: f32,
}

impl RecommendRequest {
    /// Request with every option at its default
    pub fn new(profile: Vec<ProfileEntry>) -> Self {
        Self {
            profile,
            top_k: DEFAULT_TOP_K,
            logit_weight: None,
            include_profile_holdout: false,
            include_contribution_analysis: false,
            top_contributors: DEFAULT_TOP_CONTRIBUTORS,
            use_alt_ranking: false,
            niche_boost_factor: 0.0,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// A profile item that props up a recommendation's score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub item_id: ItemId,
    pub corpus_idx: usize,
    pub score_contribution: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub corpus_idx: usize,
    pub score: f32,
    pub probability: f32,
    pub predicted_rating: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_contributors: Option<Vec<Contributor>>,
}

/// Leave-one-out diagnostics for a single profile item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutItemResult {
    pub item_id: ItemId,
    pub corpus_idx: usize,
    /// Rating fed to the normalizer (-2 for dropped-unrated)
    pub true_rating: f32,
    pub true_normalized_rating: f32,
    pub predicted_rating: f32,
    pub rating_error: f32,
    pub presence_probability: f32,
    pub recommendation_score: f32,
    /// Sum of absolute score changes over the baseline recommendations
    pub impact_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileHoldout {
    pub items: Vec<HoldoutItemResult>,
    pub mean_rating_error: f32,
    pub std_rating_error: f32,
    pub mean_presence_prob: f32,
    pub std_presence_prob: f32,
}

/// Statistics from rating normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mu: f64,
    pub sigma: f64,
    pub alpha: f64,
    pub zscore_norm: Vec<f32>,
    pub absolute_norm: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
    pub profile_holdout: Option<ProfileHoldout>,
    pub normalization_stats: NormalizationStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusResponse {
    pub corpus_ids: Vec<ItemId>,
    pub corpus_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub size: usize,
    pub max_size: usize,
}

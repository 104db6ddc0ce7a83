pub mod contributions;
pub mod encoder;
pub mod holdout;
pub mod niche_boost;
pub mod normalization;
pub mod recommendations;
pub mod scoring;
pub mod worker;

pub use encoder::{DroppedRatingPolicy, NormalizedProfile, ProfileEncoder};
pub use recommendations::{RecommendationEngine, RecommendationService};
pub use scoring::{ScoringMethod, ScoringStrategy, SoftmaxPowerBlend, ZScoreLinearBlend};

//! Popularity-aware re-ranking
//!
//! Items the model likes much more than their overall popularity would suggest get their
//! score multiplied up, which pulls less mainstream titles into the list.

use super::scoring::rank_order;
use crate::models::{PopularityDistribution, Recommendation};

/// Factors above this point grow the boost exponentially
const LINEAR_LIMIT: f64 = 0.5;

/// Growth rate of the boost curve past the linear range
const EXPONENTIAL_RATE: f64 = 4.62;

const POPULARITY_EPSILON: f64 = 1e-9;

/// Maps the request's niche factor onto the boost strength
///
/// Linear up to 0.5, then `0.5 + (f - 0.5) * exp(4.62 * (f - 0.5))`, which reaches about
/// 5.5 at `f = 1`. The factor is clamped to `[0, 1]` first.
pub fn effective_boost(factor: f32) -> f64 {
    let f = (factor as f64).clamp(0.0, 1.0);
    if f <= LINEAR_LIMIT {
        f
    } else {
        LINEAR_LIMIT + (f - LINEAR_LIMIT) * (EXPONENTIAL_RATE * (f - LINEAR_LIMIT)).exp()
    }
}

/// Score multiplier for one item
pub fn boost_multiplier(probability: f32, popularity: f32, boost: f64) -> f64 {
    let surprise = probability as f64 / (popularity as f64 + POPULARITY_EPSILON);
    1.0 + boost * (1.0 + surprise).ln()
}

/// Re-scores and re-sorts `recommendations` in place
///
/// Leaves the list untouched when the factor is not positive or no popularity data was
/// loaded.
pub fn apply_niche_boost(
    recommendations: &mut [Recommendation],
    popularity: Option<&PopularityDistribution>,
    factor: f32,
) {
    let Some(popularity) = popularity else {
        return;
    };
    if factor <= 0.0 {
        return;
    }

    let boost = effective_boost(factor);
    tracing::debug!(factor, boost, "Applying niche boost");

    for recommendation in recommendations.iter_mut() {
        let item_popularity = popularity.get(recommendation.corpus_idx).unwrap_or(0.0);
        let multiplier = boost_multiplier(recommendation.probability, item_popularity, boost);
        let boosted = (recommendation.score as f64 * multiplier) as f32;

        tracing::debug!(
            item_id = recommendation.item_id,
            popularity = item_popularity,
            probability = recommendation.probability,
            multiplier,
            original_score = recommendation.score,
            boosted_score = boosted,
            "Niche boost"
        );

        recommendation.score = boosted;
    }

    recommendations.sort_by(|a, b| rank_order((a.score, a.corpus_idx), (b.score, b.corpus_idx)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recommendation(corpus_idx: usize, score: f32, probability: f32) -> Recommendation {
        Recommendation {
            item_id: corpus_idx as i64 + 1000,
            corpus_idx,
            score,
            probability,
            predicted_rating: 0.0,
            top_contributors: None,
        }
    }

    fn popularity() -> PopularityDistribution {
        PopularityDistribution::from_counts(&[900.0, 90.0, 9.0, 1.0]).unwrap()
    }

    #[test]
    fn test_effective_boost_curve() {
        assert_eq!(effective_boost(0.0), 0.0);
        assert!((effective_boost(0.3) - 0.3).abs() < 1e-6);
        assert!((effective_boost(0.5) - 0.5).abs() < 1e-6);
        assert!((effective_boost(0.6) - 0.6587).abs() < 1e-3);
        assert!((effective_boost(1.0) - 5.537).abs() < 1e-2);
    }

    #[test]
    fn test_effective_boost_clamps_factor() {
        assert_eq!(effective_boost(-1.0), 0.0);
        assert_eq!(effective_boost(3.0), effective_boost(1.0));
    }

    #[test]
    fn test_boost_multiplier() {
        let multiplier = boost_multiplier(0.01, 0.001, effective_boost(0.6));
        assert!((multiplier - 2.58).abs() < 0.01, "got {multiplier}");
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let original = vec![
            recommendation(0, 0.9, 0.5),
            recommendation(3, 0.5, 0.1),
            recommendation(1, 0.4, 0.2),
        ];
        let mut boosted = original.clone();

        apply_niche_boost(&mut boosted, Some(&popularity()), 0.0);

        assert_eq!(boosted, original);
    }

    #[test]
    fn test_missing_popularity_is_identity() {
        let original = vec![recommendation(0, 0.9, 0.5), recommendation(3, 0.5, 0.1)];
        let mut boosted = original.clone();

        apply_niche_boost(&mut boosted, None, 1.0);

        assert_eq!(boosted, original);
    }

    #[test]
    fn test_boost_promotes_niche_items() {
        let mut recommendations = vec![
            recommendation(0, 0.9, 0.5),
            recommendation(3, 0.5, 0.1),
        ];

        apply_niche_boost(&mut recommendations, Some(&popularity()), 0.8);

        assert_eq!(recommendations[0].corpus_idx, 3);
        assert!(recommendations[0].score > 0.5);
        assert!(recommendations[1].score > 0.9);
    }
}

//! Scoring and top-K selection
//!
//! Turns the model's two output heads into a single ranking score per corpus item.

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1};

/// Logit weight used when a request does not set one
pub const DEFAULT_LOGIT_WEIGHT: f32 = 0.3;

const RATING_FLOOR: f32 = 0.001;
const STD_EPSILON: f32 = 1e-6;

/// Ranking scores plus the softmax presence probabilities they were built from
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItems {
    pub scores: Array1<f32>,
    pub probabilities: Array1<f32>,
}

/// Combines presence logits and predicted ratings into one score per item
pub trait ScoringStrategy: Send + Sync {
    fn score(
        &self,
        item_logits: ArrayView1<'_, f32>,
        rating_pred: ArrayView1<'_, f32>,
        logit_weight: f32,
    ) -> ScoredItems;
}

/// `softmax(logits)^w * max(rating + 1, 0.001)^(1 - w)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxPowerBlend;

impl ScoringStrategy for SoftmaxPowerBlend {
    fn score(
        &self,
        item_logits: ArrayView1<'_, f32>,
        rating_pred: ArrayView1<'_, f32>,
        logit_weight: f32,
    ) -> ScoredItems {
        let probabilities = softmax(item_logits);
        let rating_weight = 1.0 - logit_weight;

        let mut scores = Array1::<f32>::zeros(probabilities.len());
        ndarray::Zip::from(&mut scores)
            .and(&probabilities)
            .and(&rating_pred)
            .for_each(|score, &p, &r| {
                *score = p.powf(logit_weight) * (r + 1.0).max(RATING_FLOOR).powf(rating_weight);
            });

        ScoredItems {
            scores,
            probabilities,
        }
    }
}

/// Linear blend of independently standardized logits and ratings
#[derive(Debug, Clone, Copy, Default)]
pub struct ZScoreLinearBlend;

impl ScoringStrategy for ZScoreLinearBlend {
    fn score(
        &self,
        item_logits: ArrayView1<'_, f32>,
        rating_pred: ArrayView1<'_, f32>,
        logit_weight: f32,
    ) -> ScoredItems {
        let z_logits = standardize(item_logits);
        let z_ratings = standardize(rating_pred);
        let scores = z_logits * logit_weight + z_ratings * (1.0 - logit_weight);

        ScoredItems {
            scores,
            probabilities: softmax(item_logits),
        }
    }
}

/// Strategy chosen per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMethod {
    #[default]
    SoftmaxPower,
    ZScoreLinear,
}

impl ScoringMethod {
    pub fn from_alt_ranking(use_alt_ranking: bool) -> Self {
        if use_alt_ranking {
            Self::ZScoreLinear
        } else {
            Self::SoftmaxPower
        }
    }

    pub fn strategy(self) -> &'static dyn ScoringStrategy {
        match self {
            Self::SoftmaxPower => &SoftmaxPowerBlend,
            Self::ZScoreLinear => &ZScoreLinearBlend,
        }
    }
}

/// Numerically stable softmax
pub fn softmax(logits: ArrayView1<'_, f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Z-scores against the population std (ddof 0)
fn standardize(values: ArrayView1<'_, f32>) -> Array1<f32> {
    let Some(mean) = values.mean() else {
        return Array1::zeros(0);
    };
    let std = values.std(0.0);
    values.mapv(|v| (v - mean) / (std + STD_EPSILON))
}

/// Ranking order: higher score first, lower corpus index on ties
pub(crate) fn rank_order(a: (f32, usize), b: (f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}

/// Corpus indices of the `k` best scores, best first
///
/// Positions where `mask > 0` are never returned, so fewer than `k` indices come back
/// when `k` exceeds the number of unmasked items.
pub fn select_top_k(
    scores: ArrayView1<'_, f32>,
    mask: ArrayView1<'_, f32>,
    k: usize,
) -> Vec<usize> {
    let mut candidates: Vec<(f32, usize)> = scores
        .iter()
        .zip(mask.iter())
        .enumerate()
        .filter(|(_, (_, &m))| m <= 0.0)
        .map(|(idx, (&score, _))| (score, idx))
        .collect();

    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, |a, b| rank_order(*a, *b));
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(|a, b| rank_order(*a, *b));

    candidates.into_iter().map(|(_, idx)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ranking(scored: &ScoredItems) -> Vec<usize> {
        let mask = Array1::zeros(scored.scores.len());
        select_top_k(scored.scores.view(), mask.view(), scored.scores.len())
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probabilities = softmax(array![1.0, 2.0, 3.0, 1000.0].view());
        assert!((probabilities.sum() - 1.0).abs() < 1e-6);
        assert!(probabilities.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_power_blend_full_logit_weight_ranks_by_probability() {
        let logits = array![0.5, 3.0, -1.0, 2.0];
        let ratings = array![2.0, -1.5, 1.0, 0.0];

        let scored = SoftmaxPowerBlend.score(logits.view(), ratings.view(), 1.0);

        assert_eq!(ranking(&scored), vec![1, 3, 0, 2]);
        for (score, p) in scored.scores.iter().zip(scored.probabilities.iter()) {
            assert!((score - p).abs() < 1e-6);
        }
    }

    #[test]
    fn test_power_blend_zero_logit_weight_ranks_by_rating() {
        let logits = array![0.5, 3.0, -1.0, 2.0];
        let ratings = array![2.0, -1.5, 1.0, 0.0];

        let scored = SoftmaxPowerBlend.score(logits.view(), ratings.view(), 0.0);

        assert_eq!(ranking(&scored), vec![0, 2, 3, 1]);
        assert!((scored.scores[1] - RATING_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn test_zscore_blend_is_linear() {
        let logits = array![1.0, 2.0, 3.0];
        let ratings = array![3.0, 2.0, 1.0];

        let scored = ZScoreLinearBlend.score(logits.view(), ratings.view(), 0.5);

        for score in scored.scores.iter() {
            assert!(score.abs() < 1e-4);
        }
        assert!((scored.probabilities.sum() - 1.0).abs() < 1e-6);

        let logit_only = ZScoreLinearBlend.score(logits.view(), ratings.view(), 1.0);
        assert_eq!(ranking(&logit_only), vec![2, 1, 0]);
    }

    #[test]
    fn test_standardize_uses_population_std() {
        let z = standardize(array![1.0, 3.0].view());
        assert!((z[0] + 1.0).abs() < 1e-4);
        assert!((z[1] - 1.0).abs() < 1e-4);

        assert_eq!(standardize(array![2.0, 2.0, 2.0].view()), array![0.0f32, 0.0, 0.0]);
        assert!(standardize(Array1::<f32>::zeros(0).view()).is_empty());
    }

    #[test]
    fn test_method_selection() {
        assert_eq!(ScoringMethod::from_alt_ranking(false), ScoringMethod::SoftmaxPower);
        assert_eq!(ScoringMethod::from_alt_ranking(true), ScoringMethod::ZScoreLinear);
    }

    #[test]
    fn test_top_k_excludes_masked_items() {
        let scores = array![0.9, 0.8, 0.7, 0.6, 0.5, 0.4];
        let mask = array![1.0, 0.0, 1.0, 0.0, 0.0, 0.0];

        let top = select_top_k(scores.view(), mask.view(), 3);

        assert_eq!(top, vec![1, 3, 4]);
    }

    #[test]
    fn test_top_k_shorter_when_mostly_masked() {
        let scores = array![0.9, 0.8, 0.7];
        let mask = array![1.0, 0.0, 1.0];

        assert_eq!(select_top_k(scores.view(), mask.view(), 3), vec![1]);
    }

    #[test]
    fn test_top_k_ties_break_by_index() {
        let scores = array![0.5, 0.7, 0.5, 0.7, 0.5];
        let mask = Array1::zeros(5);

        assert_eq!(select_top_k(scores.view(), mask.view(), 4), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_top_k_zero() {
        let scores = array![0.5, 0.7];
        let mask = Array1::zeros(2);
        assert!(select_top_k(scores.view(), mask.view(), 0).is_empty());
    }

    #[test]
    fn test_top_k_tolerates_nan() {
        let scores = array![0.1, f32::NAN, 0.3, 0.2];
        let mask = Array1::zeros(4);

        let top = select_top_k(scores.view(), mask.view(), 4);

        assert_eq!(top.len(), 4);
        let finite: Vec<usize> = top.into_iter().filter(|&i| i != 1).collect();
        assert_eq!(finite, vec![2, 3, 0]);
    }
}

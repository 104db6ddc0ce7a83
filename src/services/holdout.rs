//! Leave-one-out profile analysis
//!
//! Every profile item is removed in turn and the model is re-run on the remaining
//! profile. How well the model recovers the missing item, and how much removing it moves
//! the baseline recommendations, says a lot about which items the model relies on.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use super::encoder::NormalizedProfile;
use super::normalization::mean_std;
use super::scoring::{ScoredItems, ScoringStrategy};
use crate::{
    model::{BatchExecutor, ModelResult},
    models::{HoldoutItemResult, ProfileHoldout},
};

/// Number of leading recommendations whose scores feed the impact score
pub const IMPACT_BASELINE_SIZE: usize = 50;

/// Model outputs for each leave-one-out variant of a profile
///
/// Row `i` corresponds to the profile with its `i`-th item removed.
#[derive(Debug, Clone)]
pub struct HoldoutVariants {
    rating_pred: Array2<f32>,
    scored: Vec<ScoredItems>,
}

impl HoldoutVariants {
    /// Runs all variants through the executor and scores them in parallel
    pub fn compute(
        executor: &BatchExecutor,
        profile: &NormalizedProfile,
        strategy: &dyn ScoringStrategy,
        logit_weight: f32,
    ) -> ModelResult<Self> {
        let batch = profile.holdout_batch(executor.corpus_size());
        let outputs = executor.execute(&batch)?;

        let scored = (0..outputs.len())
            .into_par_iter()
            .map(|i| {
                let (logits, ratings) = outputs.row(i);
                strategy.score(logits, ratings, logit_weight)
            })
            .collect();

        Ok(Self {
            rating_pred: outputs.rating_pred,
            scored,
        })
    }

    pub fn len(&self) -> usize {
        self.scored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }

    /// Scores of every corpus item with profile item `i` removed
    pub fn scores(&self, i: usize) -> ArrayView1<'_, f32> {
        self.scored[i].scores.view()
    }

    fn probabilities(&self, i: usize) -> ArrayView1<'_, f32> {
        self.scored[i].probabilities.view()
    }

    fn rating_pred(&self, i: usize) -> ArrayView1<'_, f32> {
        self.rating_pred.row(i)
    }
}

/// Builds the per-item holdout report
///
/// `baseline_indices` are the recommendations the impact score is measured over and
/// `baseline_scores` the full-profile scores for every corpus item. An empty baseline
/// gives every item an impact of zero.
pub fn analyze(
    profile: &NormalizedProfile,
    variants: &HoldoutVariants,
    baseline_indices: &[usize],
    baseline_scores: ArrayView1<'_, f32>,
) -> ProfileHoldout {
    let items: Vec<HoldoutItemResult> = profile
        .corpus_indices
        .iter()
        .enumerate()
        .map(|(i, &held_out)| {
            let predicted_rating = variants.rating_pred(i)[held_out];
            let true_normalized_rating = profile.normalized_ratings[i];
            let variant_scores = variants.scores(i);

            let impact_score = baseline_indices
                .iter()
                .map(|&idx| (baseline_scores[idx] - variant_scores[idx]).abs())
                .sum::<f32>();

            HoldoutItemResult {
                item_id: profile.item_ids[i],
                corpus_idx: held_out,
                true_rating: profile.original_ratings[i],
                true_normalized_rating,
                predicted_rating,
                rating_error: (predicted_rating - true_normalized_rating).abs(),
                presence_probability: variants.probabilities(i)[held_out],
                recommendation_score: variant_scores[held_out],
                impact_score,
            }
        })
        .collect();

    let errors: Vec<f64> = items.iter().map(|r| r.rating_error as f64).collect();
    let presence: Vec<f64> = items.iter().map(|r| r.presence_probability as f64).collect();
    let (mean_rating_error, std_rating_error) = mean_std(&errors);
    let (mean_presence_prob, std_presence_prob) = mean_std(&presence);

    tracing::debug!(
        items = items.len(),
        mean_rating_error,
        mean_presence_prob,
        "Profile holdout analysis complete"
    );

    ProfileHoldout {
        items,
        mean_rating_error: mean_rating_error as f32,
        std_rating_error: std_rating_error as f32,
        mean_presence_prob: mean_presence_prob as f32,
        std_presence_prob: std_presence_prob as f32,
    }
}

use ndarray::ArrayView1;

use super::encoder::NormalizedProfile;
use super::holdout::HoldoutVariants;
use crate::models::{Contributor, Recommendation};

/// Attaches the profile items that prop up each recommendation
///
/// An item contributes to a recommendation when removing it from the profile lowers the
/// recommendation's score below its full-profile score. The largest drops are kept, up
/// to `top_n` per recommendation.
pub fn attach_contributors(
    recommendations: &mut [Recommendation],
    profile: &NormalizedProfile,
    variants: &HoldoutVariants,
    baseline_scores: ArrayView1<'_, f32>,
    top_n: usize,
) {
    for recommendation in recommendations.iter_mut() {
        let idx = recommendation.corpus_idx;
        let baseline = baseline_scores[idx];

        let mut contributors: Vec<Contributor> = (0..variants.len())
            .filter_map(|i| {
                let drop = baseline - variants.scores(i)[idx];
                (drop > 0.0).then(|| Contributor {
                    item_id: profile.item_ids[i],
                    corpus_idx: profile.corpus_indices[i],
                    score_contribution: drop,
                })
            })
            .collect();

        // stable, so equal drops keep profile order
        contributors.sort_by(|a, b| b.score_contribution.total_cmp(&a.score_contribution));
        contributors.truncate(top_n);

        recommendation.top_contributors = Some(contributors);
    }
}

//! Rating normalization
//!
//! Maps raw 0-10 ratings onto the bounded scale the model was trained on. The result
//! blends a per-user z-score (which smooths over differences in how generously users
//! rate) with an absolute scale centred on a neutral rating (which keeps magnitude
//! information for sparse profiles). Users with more spread in their ratings lean on
//! the z-score, users with flat ratings lean on the absolute scale.

use ndarray::ArrayView1;

use crate::models::NormalizationStats;

/// Marker for an entry that was dropped without a rating
pub const DROPPED_SENTINEL: f32 = -2.0;

/// Divisor turning rating spread into the z-score mixing weight
const SIGMA_DIVISOR: f64 = 2.6;

/// Rating that maps to 0.0 on the absolute scale
const NEUTRAL_POINT: f64 = 5.5;

const FALLBACK_MU: f64 = 5.0;
const FALLBACK_SIGMA: f64 = 2.0;
const SIGMA_EPSILON: f64 = 1e-6;

/// Normalizes a profile's ratings
///
/// `0` is treated as unrated and replaced by the user's mean, `-2` marks a dropped
/// entry and is placed 1.5 standard deviations below the mean. Every output lies in
/// `[-2.5, 2.5]`.
pub fn normalize_ratings(scores: &[f32]) -> (Vec<f32>, NormalizationStats) {
    if scores.len() <= 1 {
        let zeros = vec![0.0; scores.len()];
        return (
            zeros.clone(),
            NormalizationStats {
                mu: 0.0,
                sigma: 0.0,
                alpha: 0.0,
                zscore_norm: zeros.clone(),
                absolute_norm: zeros,
            },
        );
    }

    let mut values: Vec<f64> = scores.iter().map(|&s| s as f64).collect();
    let rated: Vec<f64> = values.iter().copied().filter(|&v| v > 0.0).collect();

    let (mu, sigma) = if rated.is_empty() {
        (FALLBACK_MU, FALLBACK_SIGMA)
    } else {
        let (mean, std) = mean_std(&rated);
        (mean, std + SIGMA_EPSILON)
    };

    let dropped_fill = mu - 1.5 * sigma;
    for v in values.iter_mut() {
        if *v == 0.0 {
            *v = mu;
        } else if *v == DROPPED_SENTINEL as f64 {
            *v = dropped_fill;
        }
    }

    let zscore_norm: Vec<f64> = values
        .iter()
        .map(|&v| ((v - mu) / sigma).clamp(-3.0, 3.0))
        .collect();
    let absolute_norm: Vec<f64> = values
        .iter()
        .map(|&v| ((v - NEUTRAL_POINT) / 2.5).clamp(-2.5, 2.0))
        .collect();

    let alpha = (sigma / SIGMA_DIVISOR).clamp(0.3, 0.8);

    let normalized = zscore_norm
        .iter()
        .zip(&absolute_norm)
        .map(|(&z, &a)| (alpha * z + (1.0 - alpha) * a).clamp(-2.5, 2.5) as f32)
        .collect();

    let stats = NormalizationStats {
        mu,
        sigma,
        alpha,
        zscore_norm: zscore_norm.iter().map(|&v| v as f32).collect(),
        absolute_norm: absolute_norm.iter().map(|&v| v as f32).collect(),
    };

    (normalized, stats)
}

/// Mean and population standard deviation (ddof 0), zeros for an empty slice
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    let values = ArrayView1::from(values);
    match values.mean() {
        Some(mean) => (mean, values.std(0.0)),
        None => (0.0, 0.0),
    }
}

use std::collections::BTreeMap;

use ndarray::{s, Array1, Array2};
use serde::Deserialize;

use super::normalization::{normalize_ratings, DROPPED_SENTINEL};
use crate::{
    error::{AppError, AppResult},
    models::{Corpus, ItemId, NormalizationStats, ProfileEntry},
};

/// Watch states that count as having engaged with an item even without a rating
const ENGAGED_STATUSES: [&str; 3] = ["completed", "watching", "dropped"];

const DROPPED_STATUS: &str = "dropped";

/// When a "dropped" entry is encoded with the dropped-rating sentinel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroppedRatingPolicy {
    /// Only dropped entries without a rating; an explicit rating is kept
    #[default]
    UnratedOnly,
    /// Every dropped entry, discarding any rating the user gave
    Always,
}

/// A profile restricted to corpus items, in ascending corpus index order
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProfile {
    pub item_ids: Vec<ItemId>,
    pub corpus_indices: Vec<usize>,
    pub normalized_ratings: Vec<f32>,
    pub original_ratings: Vec<f32>,
    pub stats: NormalizationStats,
}

/// Presence and rating blocks of the model input
#[derive(Debug, Clone, PartialEq)]
pub struct DenseProfile {
    pub presence: Array1<f32>,
    pub ratings: Array1<f32>,
}

impl DenseProfile {
    /// Wire layout consumed by the model: presence block followed by rating block
    pub fn to_input(&self) -> Array1<f32> {
        let n = self.presence.len();
        let mut input = Array1::zeros(n * 2);
        input.slice_mut(s![..n]).assign(&self.presence);
        input.slice_mut(s![n..]).assign(&self.ratings);
        input
    }
}

impl NormalizedProfile {
    pub fn len(&self) -> usize {
        self.corpus_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus_indices.is_empty()
    }

    /// Dense encoding of the whole profile
    pub fn dense(&self, corpus_size: usize) -> DenseProfile {
        let mut presence = Array1::zeros(corpus_size);
        let mut ratings = Array1::zeros(corpus_size);
        for (&idx, &value) in self.corpus_indices.iter().zip(&self.normalized_ratings) {
            presence[idx] = 1.0;
            ratings[idx] = value;
        }
        DenseProfile { presence, ratings }
    }

    /// One model input row per profile item, each with exactly that item removed
    pub fn holdout_batch(&self, corpus_size: usize) -> Array2<f32> {
        let full = self.dense(corpus_size).to_input();
        let mut batch = Array2::zeros((self.len(), corpus_size * 2));
        for (row, &held_out) in self.corpus_indices.iter().enumerate() {
            let mut input = batch.row_mut(row);
            input.assign(&full);
            input[held_out] = 0.0;
            input[corpus_size + held_out] = 0.0;
        }
        batch
    }
}

/// Maps raw user profiles onto the corpus
#[derive(Debug, Clone, Copy)]
pub struct ProfileEncoder<'a> {
    corpus: &'a Corpus,
    policy: DroppedRatingPolicy,
}

impl<'a> ProfileEncoder<'a> {
    pub fn new(corpus: &'a Corpus, policy: DroppedRatingPolicy) -> Self {
        Self { corpus, policy }
    }

    /// Filters, orders and normalizes a profile
    ///
    /// Entries outside the corpus, and entries that are neither rated nor watched, are
    /// skipped. If an item appears more than once the last entry wins.
    pub fn encode(&self, entries: &[ProfileEntry]) -> AppResult<NormalizedProfile> {
        let mut valid: BTreeMap<usize, &ProfileEntry> = BTreeMap::new();
        for entry in entries {
            let Some(corpus_idx) = self.corpus.index_of(entry.item_id) else {
                continue;
            };
            if entry.rating > 0.0 || ENGAGED_STATUSES.contains(&entry.watch_status.as_str()) {
                valid.insert(corpus_idx, entry);
            }
        }

        if valid.is_empty() {
            return Err(AppError::InvalidInput(
                "No valid entries in user profile".to_string(),
            ));
        }

        let corpus_indices: Vec<usize> = valid.keys().copied().collect();
        let item_ids: Vec<ItemId> = valid.values().map(|e| e.item_id).collect();
        let original_ratings: Vec<f32> = valid.values().map(|e| self.input_rating(e)).collect();
        let (normalized_ratings, stats) = normalize_ratings(&original_ratings);

        tracing::debug!(
            submitted = entries.len(),
            valid = corpus_indices.len(),
            "Encoded user profile"
        );

        Ok(NormalizedProfile {
            item_ids,
            corpus_indices,
            normalized_ratings,
            original_ratings,
            stats,
        })
    }

    fn input_rating(&self, entry: &ProfileEntry) -> f32 {
        let dropped = entry.watch_status == DROPPED_STATUS;
        match self.policy {
            DroppedRatingPolicy::UnratedOnly if dropped && entry.rating == 0.0 => {
                DROPPED_SENTINEL
            }
            DroppedRatingPolicy::Always if dropped => DROPPED_SENTINEL,
            _ => entry.rating,
        }
    }
}

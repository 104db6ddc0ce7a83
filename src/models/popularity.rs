use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::corpus::{Corpus, ItemId};
use crate::error::AppResult;

/// One row of the metadata table; extra columns are ignored
#[derive(Debug, Deserialize)]
struct MetadataRow {
    id: ItemId,
    rating_count: u64,
}

/// Per-item share of all ratings across the corpus, indexed by corpus index
#[derive(Debug, Clone)]
pub struct PopularityDistribution {
    shares: Vec<f32>,
}

impl PopularityDistribution {
    /// Normalizes raw counts (corpus order) into a distribution summing to 1
    ///
    /// Returns `None` when there is nothing to normalize.
    pub fn from_counts(counts: &[f64]) -> Option<Self> {
        let total: f64 = counts.iter().filter(|c| **c > 0.0).sum();
        if total <= 0.0 {
            return None;
        }

        let shares = counts
            .iter()
            .map(|&c| (c.max(0.0) / total) as f32)
            .collect();
        Some(Self { shares })
    }

    /// Builds the distribution from a metadata CSV (`id`, `rating_count`)
    pub fn from_reader<R: Read>(reader: R, corpus: &Corpus) -> AppResult<Option<Self>> {
        let mut rating_counts: HashMap<ItemId, u64> = HashMap::new();
        let mut csv_reader = csv::Reader::from_reader(reader);
        for row in csv_reader.deserialize::<MetadataRow>() {
            let row = row?;
            rating_counts.insert(row.id, row.rating_count);
        }

        let mut missing = 0usize;
        let counts: Vec<f64> = corpus
            .ids()
            .iter()
            .map(|item_id| match rating_counts.get(item_id) {
                Some(&count) => count as f64,
                None => {
                    tracing::warn!(item_id, "No metadata found for corpus item");
                    missing += 1;
                    0.0
                }
            })
            .collect();

        if missing > 0 {
            tracing::warn!(missing, "Corpus items without rating counts");
        }

        let distribution = Self::from_counts(&counts);
        match &distribution {
            Some(d) => tracing::info!(
                min = d.min(),
                max = d.max(),
                mean = 1.0 / d.len() as f32,
                "Loaded popularity distribution"
            ),
            None => {
                tracing::warn!("No valid rating counts found, niche boost will be disabled")
            }
        }

        Ok(distribution)
    }

    /// Loads the metadata table from disk; a missing file disables niche boosting
    pub fn load<P: AsRef<Path>>(path: P, corpus: &Corpus) -> AppResult<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Metadata file not found, niche boost will be disabled"
            );
            return Ok(None);
        }

        tracing::info!(path = %path.display(), "Loading metadata");
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, corpus)
    }

    pub fn get(&self, corpus_idx: usize) -> Option<f32> {
        self.shares.get(corpus_idx).copied()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    fn min(&self) -> f32 {
        self.shares.iter().copied().fold(f32::INFINITY, f32::min)
    }

    fn max(&self) -> f32 {
        self.shares.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts_sums_to_one() {
        let distribution = PopularityDistribution::from_counts(&[1.0, 3.0, 0.0, 4.0]).unwrap();
        let total: f32 = (0..distribution.len())
            .map(|i| distribution.get(i).unwrap())
            .sum();

        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(distribution.get(2), Some(0.0));
        assert!((distribution.get(3).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_from_counts_all_zero_disables() {
        assert!(PopularityDistribution::from_counts(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_from_reader_maps_by_corpus_order() {
        let corpus = Corpus::from_ids(vec![30, 10, 20], 3).unwrap();
        let csv = "id,title,rating_count\n10,Alpha,100\n20,Beta,300\n30,Gamma,600\n99,Other,5\n";

        let distribution = PopularityDistribution::from_reader(csv.as_bytes(), &corpus)
            .unwrap()
            .unwrap();

        assert!((distribution.get(0).unwrap() - 0.6).abs() < 1e-6);
        assert!((distribution.get(1).unwrap() - 0.1).abs() < 1e-6);
        assert!((distribution.get(2).unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_from_reader_missing_items_get_zero() {
        let corpus = Corpus::from_ids(vec![1, 2], 2).unwrap();
        let csv = "id,rating_count\n1,10\n";

        let distribution = PopularityDistribution::from_reader(csv.as_bytes(), &corpus)
            .unwrap()
            .unwrap();

        assert_eq!(distribution.get(0), Some(1.0));
        assert_eq!(distribution.get(1), Some(0.0));
    }

    #[test]
    fn test_from_reader_rejects_malformed_rows() {
        let corpus = Corpus::from_ids(vec![1], 1).unwrap();
        let csv = "id,rating_count\n1,not-a-number\n";

        assert!(PopularityDistribution::from_reader(csv.as_bytes(), &corpus).is_err());
    }

    #[test]
    fn test_load_missing_file_disables() {
        let corpus = Corpus::from_ids(vec![1], 1).unwrap();
        let result = PopularityDistribution::load("/nonexistent/metadata.csv", &corpus).unwrap();
        assert!(result.is_none());
    }
}

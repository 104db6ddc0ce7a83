use std::collections::HashMap;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// External item identifier
pub type ItemId = i64;

/// The fixed, ordered universe of recommendable items
///
/// Position in the corpus is the item's corpus index, i.e. the column it occupies in
/// every model input and output. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Corpus {
    ids: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
}

impl Corpus {
    /// Builds a corpus from an ordered id list, enforcing the expected size and
    /// uniqueness of ids
    pub fn from_ids(ids: Vec<ItemId>, expected_size: usize) -> AppResult<Self> {
        if ids.len() != expected_size {
            return Err(AppError::Config(format!(
                "corpus has {} items, expected {}",
                ids.len(),
                expected_size
            )));
        }

        let mut index = HashMap::with_capacity(ids.len());
        for (idx, &item_id) in ids.iter().enumerate() {
            if let Some(previous) = index.insert(item_id, idx) {
                return Err(AppError::Config(format!(
                    "corpus item {} appears at both index {} and {}",
                    item_id, previous, idx
                )));
            }
        }

        Ok(Self { ids, index })
    }

    /// Loads a JSON array of item ids from disk
    pub fn load<P: AsRef<Path>>(path: P, expected_size: usize) -> AppResult<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading corpus mapping");

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read corpus {}: {}", path.display(), e))
        })?;
        let ids: Vec<ItemId> = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("failed to parse corpus {}: {}", path.display(), e))
        })?;

        let corpus = Self::from_ids(ids, expected_size)?;
        tracing::info!(corpus_size = corpus.len(), "Corpus mapping loaded");
        Ok(corpus)
    }

    pub fn index_of(&self, item_id: ItemId) -> Option<usize> {
        self.index.get(&item_id).copied()
    }

    pub fn id_of(&self, index: usize) -> Option<ItemId> {
        self.ids.get(index).copied()
    }

    /// Item ids ordered by corpus index
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

use std::sync::Arc;

use ndarray::{concatenate, s, Array1, Array2, Axis};
use rayon::prelude::*;

use super::{BatchOutput, ModelError, ModelOutput, ModelResult, Recommender};

/// Parallel batch executor
///
/// Splits a batch of dense encodings into equally sized shards, runs the shards on the
/// rayon pool and stitches the rows back together in input order. The final shard is
/// zero-padded up to the common shard size so every model call sees the same batch
/// shape; padded rows are dropped before returning.
#[derive(Clone)]
pub struct BatchExecutor {
    model: Arc<dyn Recommender>,
    shards: usize,
}

impl BatchExecutor {
    pub fn new(model: Arc<dyn Recommender>, shards: usize) -> Self {
        Self {
            model,
            shards: shards.max(1),
        }
    }

    pub fn corpus_size(&self) -> usize {
        self.model.corpus_size()
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    fn input_width(&self) -> usize {
        self.corpus_size() * 2
    }

    /// Runs a single dense encoding
    pub fn infer(&self, input: &Array1<f32>) -> ModelResult<ModelOutput> {
        if input.len() != self.input_width() {
            return Err(ModelError::InputShape {
                expected: self.input_width(),
                actual: input.len(),
            });
        }

        let output = self.model.infer(input)?;
        super::check_output_len(output.item_logits.len(), 1, self.corpus_size())?;
        super::check_output_len(output.rating_pred.len(), 1, self.corpus_size())?;
        Ok(output)
    }

    /// Runs every row of `batch`, returning one output row per input row
    pub fn execute(&self, batch: &Array2<f32>) -> ModelResult<BatchOutput> {
        let corpus_size = self.corpus_size();
        if batch.ncols() != self.input_width() {
            return Err(ModelError::InputShape {
                expected: self.input_width(),
                actual: batch.ncols(),
            });
        }

        let rows = batch.nrows();
        if rows == 0 {
            return Ok(BatchOutput {
                item_logits: Array2::zeros((0, corpus_size)),
                rating_pred: Array2::zeros((0, corpus_size)),
            });
        }

        let shard_rows = rows.div_ceil(self.shards.min(rows));
        let shard_count = rows.div_ceil(shard_rows);

        tracing::debug!(
            rows,
            shard_rows,
            shard_count,
            "Executing batched inference"
        );

        let outputs = (0..shard_count)
            .into_par_iter()
            .map(|shard| self.run_shard(batch, shard * shard_rows, shard_rows))
            .collect::<ModelResult<Vec<_>>>()?;

        let logits: Vec<_> = outputs.iter().map(|o| o.item_logits.view()).collect();
        let ratings: Vec<_> = outputs.iter().map(|o| o.rating_pred.view()).collect();

        Ok(BatchOutput {
            item_logits: concatenate(Axis(0), &logits)
                .map_err(|e| ModelError::Inference(e.to_string()))?,
            rating_pred: concatenate(Axis(0), &ratings)
                .map_err(|e| ModelError::Inference(e.to_string()))?,
        })
    }

    fn run_shard(
        &self,
        batch: &Array2<f32>,
        start: usize,
        shard_rows: usize,
    ) -> ModelResult<BatchOutput> {
        let real = shard_rows.min(batch.nrows() - start);

        let mut chunk = Array2::<f32>::zeros((shard_rows, batch.ncols()));
        chunk
            .slice_mut(s![..real, ..])
            .assign(&batch.slice(s![start..start + real, ..]));

        let output = self.model.infer_batch(&chunk)?;
        let corpus_size = self.corpus_size();
        super::check_output_len(output.item_logits.len(), shard_rows, corpus_size)?;
        super::check_output_len(output.rating_pred.len(), shard_rows, corpus_size)?;

        Ok(BatchOutput {
            item_logits: output.item_logits.slice(s![..real, ..]).to_owned(),
            rating_pred: output.rating_pred.slice(s![..real, ..]).to_owned(),
        })
    }
}

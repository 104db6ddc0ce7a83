//! Model seam
//!
//! The recommender model itself (architecture, parameters, training) lives outside this
//! crate. Everything the serving engine needs from it is captured by the [`Recommender`]
//! trait: a pure, deterministic function from a dense profile encoding of width `2N` to a
//! pair of `N`-wide heads (presence logits and predicted normalized ratings).

use ndarray::{Array1, Array2, ArrayView1};

pub mod executor;
pub mod onnx;

pub use executor::BatchExecutor;
pub use onnx::OnnxRecommender;

/// Errors raised by model implementations
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Expected input width {expected}, got {actual}")]
    InputShape { expected: usize, actual: usize },

    #[error("Model returned {actual} values, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Both output heads for a single encoded profile
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub item_logits: Array1<f32>,
    pub rating_pred: Array1<f32>,
}

/// Both output heads for a batch of encoded profiles, one row per input row
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub item_logits: Array2<f32>,
    pub rating_pred: Array2<f32>,
}

impl BatchOutput {
    pub fn len(&self) -> usize {
        self.item_logits.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Views of both heads for one batch row
    pub fn row(&self, i: usize) -> (ArrayView1<'_, f32>, ArrayView1<'_, f32>) {
        (self.item_logits.row(i), self.rating_pred.row(i))
    }
}

/// Latent-factor recommender model
///
/// Implementations are expected to use all available compute for a single call, so
/// callers serialize access through the inference worker rather than calling
/// concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait Recommender: Send + Sync {
    /// Number of items the model scores (`N`)
    fn corpus_size(&self) -> usize;

    /// Run one dense encoding of width `2N`
    fn infer(&self, input: &Array1<f32>) -> ModelResult<ModelOutput>;

    /// Run a `[B, 2N]` batch of dense encodings
    fn infer_batch(&self, inputs: &Array2<f32>) -> ModelResult<BatchOutput>;
}

/// Checks a model's raw output length against the expected `[rows, N]` shape
pub(crate) fn check_output_len(
    actual: usize,
    rows: usize,
    corpus_size: usize,
) -> ModelResult<()> {
    let expected = rows * corpus_size;
    if actual != expected {
        return Err(ModelError::OutputShape { expected, actual });
    }
    Ok(())
}

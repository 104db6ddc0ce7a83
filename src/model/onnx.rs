//! ONNX model adapter
//!
//! Loads an ONNX export of the recommender with tract-onnx. The exported graph takes a
//! `[batch, 2N]` float input (presence block then rating block) and produces
//! `item_logits` and `rating_pred`, each `[batch, N]`, as its first two outputs.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use tract_onnx::prelude::*;
use tracing::info;

use super::{BatchOutput, ModelError, ModelOutput, ModelResult, Recommender};

type OnnxPlan = TypedRunnableModel<TypedModel>;

pub struct OnnxRecommender {
    plan: OnnxPlan,
    corpus_size: usize,
}

impl OnnxRecommender {
    /// Load and optimize an ONNX model from file
    pub fn load<P: AsRef<Path>>(model_path: P, corpus_size: usize) -> ModelResult<Self> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(ModelError::Load(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        info!(path = %path.display(), corpus_size, "Loading ONNX model");

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "ONNX model loaded");

        Ok(Self { plan, corpus_size })
    }

    fn run(&self, rows: usize, data: Vec<f32>) -> ModelResult<BatchOutput> {
        let width = self.corpus_size * 2;
        let input = tract_ndarray::Array2::from_shape_vec((rows, width), data)
            .map_err(|e| ModelError::Inference(format!("Input conversion failed: {}", e)))?;
        let tensor: Tensor = input.into_dyn().into();

        let outputs = self
            .plan
            .run(tvec!(tensor.into_tvalue()))
            .map_err(|e| ModelError::Inference(format!("ONNX inference failed: {}", e)))?;

        if outputs.len() < 2 {
            return Err(ModelError::Inference(format!(
                "Model produced {} outputs, expected item_logits and rating_pred",
                outputs.len()
            )));
        }

        Ok(BatchOutput {
            item_logits: self.extract(&outputs[0], rows)?,
            rating_pred: self.extract(&outputs[1], rows)?,
        })
    }

    fn extract(&self, value: &TValue, rows: usize) -> ModelResult<Array2<f32>> {
        let view = value
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(format!("Output extraction failed: {}", e)))?;
        let values: Vec<f32> = view.iter().copied().collect();
        super::check_output_len(values.len(), rows, self.corpus_size)?;

        Array2::from_shape_vec((rows, self.corpus_size), values)
            .map_err(|e| ModelError::Inference(format!("Output conversion failed: {}", e)))
    }
}

impl Recommender for OnnxRecommender {
    fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    fn infer(&self, input: &Array1<f32>) -> ModelResult<ModelOutput> {
        let batch = input.view().insert_axis(Axis(0)).to_owned();
        let output = self.infer_batch(&batch)?;
        Ok(ModelOutput {
            item_logits: output.item_logits.row(0).to_owned(),
            rating_pred: output.rating_pred.row(0).to_owned(),
        })
    }

    fn infer_batch(&self, inputs: &Array2<f32>) -> ModelResult<BatchOutput> {
        let width = self.corpus_size * 2;
        if inputs.ncols() != width {
            return Err(ModelError::InputShape {
                expected: width,
                actual: inputs.ncols(),
            });
        }

        self.run(inputs.nrows(), inputs.iter().copied().collect())
    }
}

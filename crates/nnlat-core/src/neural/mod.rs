//! Class-based recurrent language model on candle.
//!
//! The network projects the class of the previous word, runs it through a
//! stack of recurrent layers, and predicts a distribution over word classes.
//! A model directory holds `config.json` and `model.safetensors`.

mod rnn;

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{embedding, linear, Embedding, Linear, VarBuilder};
use serde::Deserialize;

use crate::evaluator::{EvaluatorError, StepEvaluator, StepInput, StepOutput};
use crate::state::BatchState;

pub use rnn::LayerConfig;
use rnn::RecurrentLayer;

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Architecture of an [`RnnLm`], read from `config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RnnLmConfig {
    pub num_classes: usize,
    pub projection_size: usize,
    pub layers: Vec<LayerConfig>,
}

impl RnnLmConfig {
    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.layers.is_empty() {
            anyhow::bail!("model has no recurrent layers");
        }
        if config.num_classes == 0 || config.projection_size == 0 {
            anyhow::bail!("num_classes and projection_size must be positive");
        }
        if let Some(i) = config.layers.iter().position(|l| l.size() == 0) {
            anyhow::bail!("layer {i} has size 0");
        }
        Ok(config)
    }
}

pub struct RnnLm {
    config: RnnLmConfig,
    projection: Embedding,
    layers: Vec<RecurrentLayer>,
    output: Linear,
    state_sizes: Vec<usize>,
    device: Device,
}

impl RnnLm {
    /// Load a model directory.
    pub fn open(model_dir: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let config_path = model_dir.join(CONFIG_FILE);
        let json = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", config_path.display()))?;
        let config = RnnLmConfig::parse_json(&json)?;

        let weights_path = model_dir.join(WEIGHTS_FILE);
        let tensors = candle_core::safetensors::load(&weights_path, &device).map_err(|e| {
            anyhow::anyhow!("failed to load {}: {e}", weights_path.display())
        })?;
        Self::from_tensors(config, tensors, &device)
    }

    pub fn from_tensors(
        config: RnnLmConfig,
        tensors: HashMap<String, Tensor>,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        Self::load(config, vb).map_err(|e| anyhow::anyhow!("failed to build network: {e}"))
    }

    /// Build the network from a var builder laid out as
    /// `projection.*`, `layers.<i>.*`, `output.*`.
    pub fn load(config: RnnLmConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let projection = embedding(
            config.num_classes,
            config.projection_size,
            vb.pp("projection"),
        )?;

        let mut layers = Vec::with_capacity(config.layers.len());
        let mut in_dim = config.projection_size;
        let layers_vb = vb.pp("layers");
        for (i, &layer) in config.layers.iter().enumerate() {
            layers.push(RecurrentLayer::load(layer, in_dim, layers_vb.pp(i.to_string()))?);
            in_dim = layer.size();
        }
        let output = linear(in_dim, config.num_classes, vb.pp("output"))?;

        let state_sizes = config.layers.iter().flat_map(|l| l.state_sizes()).collect();
        Ok(Self {
            device: vb.device().clone(),
            config,
            projection,
            layers,
            output,
            state_sizes,
        })
    }

    pub fn config(&self) -> &RnnLmConfig {
        &self.config
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn check_class_ids(&self, ids: &[u32]) -> Result<(), EvaluatorError> {
        match ids.iter().find(|&&id| id as usize >= self.config.num_classes) {
            Some(id) => Err(EvaluatorError::Backend(format!(
                "class id {id} out of range for a network with {} classes",
                self.config.num_classes
            ))),
            None => Ok(()),
        }
    }
}

impl StepEvaluator for RnnLm {
    fn state_sizes(&self) -> &[usize] {
        &self.state_sizes
    }

    fn evaluate(&self, input: &StepInput) -> Result<StepOutput, EvaluatorError> {
        input.validate()?;
        self.check_class_ids(&input.prev_class_ids)?;
        self.check_class_ids(&input.target_class_ids)?;
        if input.state.sizes() != self.state_sizes.as_slice() {
            return Err(EvaluatorError::Backend(format!(
                "state sizes {:?} do not match the network's {:?}",
                input.state.sizes(),
                self.state_sizes
            )));
        }
        let batch = input.batch_size();

        let prev = Tensor::from_slice(&input.prev_class_ids, batch, &self.device)?;
        let mut x = self.projection.forward(&prev)?;

        let mut state_index = 0;
        let mut new_state = Vec::with_capacity(self.state_sizes.len());
        for layer in &self.layers {
            let count = layer.num_state_vectors();
            let mut layer_state = Vec::with_capacity(count);
            for index in state_index..state_index + count {
                let size = self.state_sizes[index];
                let rows = input.state.rows(index);
                layer_state.push(Tensor::from_slice(rows, (batch, size), &self.device)?);
            }
            let (output, next) = layer.step(&x, &layer_state)?;
            for tensor in next {
                new_state.push(tensor.flatten_all()?.to_vec1::<f32>()?);
            }
            x = output;
            state_index += count;
        }

        let logits = self.output.forward(&x)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
        let targets = Tensor::from_slice(&input.target_class_ids, (batch, 1), &self.device)?;
        let logprobs = log_probs.gather(&targets, 1)?.squeeze(1)?.to_vec1::<f32>()?;

        let state = BatchState::from_rows(batch, self.state_sizes.clone(), new_state)?;
        Ok(StepOutput { logprobs, state })
    }
}

#[cfg(test)]
mod tests;

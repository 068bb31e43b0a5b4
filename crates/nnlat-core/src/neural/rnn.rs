//! Recurrent layers of the class-based RNN language model.

use candle_core::{Module, Result, Tensor};
use candle_nn::rnn::{LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{linear, linear_no_bias, Linear, VarBuilder};
use serde::Deserialize;

/// One hidden layer in `config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerConfig {
    /// LSTM; state is the hidden and cell vectors.
    Lstm { size: usize },
    /// Simple recurrent layer `h' = tanh(W x + U h + b)`; state is `h`.
    Tanh { size: usize },
}

impl LayerConfig {
    pub fn size(&self) -> usize {
        match *self {
            Self::Lstm { size } | Self::Tanh { size } => size,
        }
    }

    /// Sizes of the state vectors this layer carries between steps.
    pub fn state_sizes(&self) -> Vec<usize> {
        match *self {
            Self::Lstm { size } => vec![size, size],
            Self::Tanh { size } => vec![size],
        }
    }
}

pub(super) enum RecurrentLayer {
    Lstm(LSTM),
    Tanh { input: Linear, recurrent: Linear },
}

impl RecurrentLayer {
    /// Weight names under `vb`:
    /// - lstm: `weight_ih_l0`, `weight_hh_l0`, `bias_ih_l0`, `bias_hh_l0`
    /// - tanh: `input.weight`, `input.bias`, `recurrent.weight`
    pub(super) fn load(config: LayerConfig, in_dim: usize, vb: VarBuilder) -> Result<Self> {
        match config {
            LayerConfig::Lstm { size } => {
                let lstm_config = LSTMConfig {
                    layer_idx: 0,
                    ..Default::default()
                };
                Ok(Self::Lstm(LSTM::new(in_dim, size, lstm_config, vb)?))
            }
            LayerConfig::Tanh { size } => Ok(Self::Tanh {
                input: linear(in_dim, size, vb.pp("input"))?,
                recurrent: linear_no_bias(size, size, vb.pp("recurrent"))?,
            }),
        }
    }

    pub(super) fn num_state_vectors(&self) -> usize {
        match self {
            Self::Lstm(_) => 2,
            Self::Tanh { .. } => 1,
        }
    }

    /// Advance one step. `state` holds this layer's `[batch, size]` state
    /// tensors; returns the layer output and the new state tensors.
    pub(super) fn step(&self, input: &Tensor, state: &[Tensor]) -> Result<(Tensor, Vec<Tensor>)> {
        match self {
            Self::Lstm(lstm) => {
                let prev = LSTMState::new(state[0].clone(), state[1].clone());
                let next = lstm.step(input, &prev)?;
                Ok((next.h.clone(), vec![next.h, next.c]))
            }
            Self::Tanh { input: w, recurrent } => {
                let h = (w.forward(input)? + recurrent.forward(&state[0])?)?.tanh()?;
                Ok((h.clone(), vec![h]))
            }
        }
    }
}

//! Single-step network evaluation consumed by the decoder.

use crate::state::{BatchState, StateError};

/// Inputs of one batched network step. Row `i` of every field belongs to the
/// same sequence.
#[derive(Debug, Clone)]
pub struct StepInput {
    /// Previous word of each sequence, already limited to the shortlist.
    pub prev_word_ids: Vec<u32>,
    /// Class of each previous word.
    pub prev_class_ids: Vec<u32>,
    /// Class whose probability is requested for each sequence.
    pub target_class_ids: Vec<u32>,
    /// Recurrent state entering this step.
    pub state: BatchState,
}

impl StepInput {
    pub fn batch_size(&self) -> usize {
        self.prev_word_ids.len()
    }

    /// Check that all per-row fields agree on the batch size.
    pub fn validate(&self) -> Result<(), EvaluatorError> {
        let n = self.prev_word_ids.len();
        for (field, len) in [
            ("prev_class_ids", self.prev_class_ids.len()),
            ("target_class_ids", self.target_class_ids.len()),
            ("state", self.state.batch_size()),
        ] {
            if len != n {
                return Err(EvaluatorError::BatchMismatch {
                    field,
                    expected: n,
                    actual: len,
                });
            }
        }
        Ok(())
    }
}

/// Outputs of one batched network step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Natural-log probability of the target class, one per row.
    pub logprobs: Vec<f32>,
    /// Recurrent state after consuming the previous words.
    pub state: BatchState,
}

/// Computes next-word log-probabilities for a batch of sequences.
///
/// Implementations hold immutable parameters, so one evaluator can serve
/// several decoders on different threads.
pub trait StepEvaluator: Send + Sync {
    /// Sizes of the recurrent state vectors of a single sequence.
    fn state_sizes(&self) -> &[usize];

    /// Run one step for every row of `input`. Must accept any batch size of
    /// at least one row.
    fn evaluate(&self, input: &StepInput) -> Result<StepOutput, EvaluatorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("batch size mismatch in {field}: expected {expected}, got {actual}")]
    BatchMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid recurrent state: {0}")]
    State(#[from] StateError),

    #[error("network evaluation failed: {0}")]
    Backend(String),

    #[cfg(feature = "neural")]
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

//! Recurrent layer state of single sequences and of evaluation batches.
//!
//! A [`RecurrentState`] belongs to one token. Its vectors are reference
//! counted: copying a token shares them, and a new snapshot is only created
//! when the token's state is replaced after a network step. Nothing mutates a
//! snapshot in place.

use std::sync::Arc;

/// Per-sequence recurrent state: one vector per state input of the network
/// (an LSTM layer contributes two, cell and hidden).
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState {
    vectors: Vec<Arc<[f32]>>,
}

impl RecurrentState {
    /// Zero-initialized state with the given vector sizes.
    pub fn zeros(sizes: &[usize]) -> Self {
        Self {
            vectors: sizes.iter().map(|&size| Arc::from(vec![0.0; size])).collect(),
        }
    }

    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors: vectors.into_iter().map(Arc::from).collect(),
        }
    }

    pub fn num_vectors(&self) -> usize {
        self.vectors.len()
    }

    pub fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index]
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.vectors.iter().map(|v| v.len()).collect()
    }

    /// True if both states share the same underlying vectors.
    pub fn shares_storage_with(&self, other: &RecurrentState) -> bool {
        self.vectors.len() == other.vectors.len()
            && self
                .vectors
                .iter()
                .zip(&other.vectors)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// State of a batch of sequences, laid out row-major as `[batch, size]` for
/// every state vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchState {
    batch_size: usize,
    sizes: Vec<usize>,
    data: Vec<Vec<f32>>,
}

impl BatchState {
    /// Stack per-sequence states into one batch. All states must have the
    /// same vector sizes as `sizes`.
    pub fn combine(states: &[&RecurrentState], sizes: &[usize]) -> Result<Self, StateError> {
        let mut data: Vec<Vec<f32>> = sizes
            .iter()
            .map(|&size| Vec::with_capacity(size * states.len()))
            .collect();
        for state in states {
            if state.num_vectors() != sizes.len() {
                return Err(StateError::VectorCount {
                    expected: sizes.len(),
                    actual: state.num_vectors(),
                });
            }
            for (index, (&size, rows)) in sizes.iter().zip(data.iter_mut()).enumerate() {
                let vector = state.vector(index);
                if vector.len() != size {
                    return Err(StateError::VectorSize {
                        index,
                        expected: size,
                        actual: vector.len(),
                    });
                }
                rows.extend_from_slice(vector);
            }
        }
        Ok(Self {
            batch_size: states.len(),
            sizes: sizes.to_vec(),
            data,
        })
    }

    /// Wrap row-major data returned by a network step.
    pub fn from_rows(
        batch_size: usize,
        sizes: Vec<usize>,
        data: Vec<Vec<f32>>,
    ) -> Result<Self, StateError> {
        if data.len() != sizes.len() {
            return Err(StateError::VectorCount {
                expected: sizes.len(),
                actual: data.len(),
            });
        }
        for (index, (rows, &size)) in data.iter().zip(&sizes).enumerate() {
            if rows.len() != size * batch_size {
                return Err(StateError::VectorSize {
                    index,
                    expected: size * batch_size,
                    actual: rows.len(),
                });
            }
        }
        Ok(Self {
            batch_size,
            sizes,
            data,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Row-major `[batch, size]` data of state vector `index`.
    pub fn rows(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    /// Copy out the state of sequence `row` as an independent snapshot.
    pub fn slice(&self, row: usize) -> RecurrentState {
        RecurrentState {
            vectors: self
                .sizes
                .iter()
                .zip(&self.data)
                .map(|(&size, rows)| Arc::from(&rows[row * size..(row + 1) * size]))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("expected {expected} state vectors, got {actual}")]
    VectorCount { expected: usize, actual: usize },
    #[error("state vector {index} has {actual} values, expected {expected}")]
    VectorSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

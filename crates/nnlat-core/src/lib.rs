//! Word lattice decoding with a recurrent neural network language model.
//!
//! The decoder propagates tokens through a lattice in topological order,
//! rescoring every word with a batched [`evaluator::StepEvaluator`] call and
//! interpolating the network score with the lattice's own LM score.

pub mod decoder;
pub mod evaluator;
pub mod interpolate;
pub mod lattice;
#[cfg(feature = "neural")]
pub mod neural;
pub mod output;
pub mod settings;
pub mod state;
pub mod vocabulary;

pub use decoder::{DecodeError, LatticeDecoder, Token};
pub use lattice::Lattice;
pub use settings::{ConfigError, DecoderConfig};
pub use vocabulary::Vocabulary;

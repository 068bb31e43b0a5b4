//! Token-passing lattice decoder with neural LM rescoring.
//!
//! Tokens start at the initial node and travel along every link in
//! topological order. Each link that carries a word triggers one batched
//! network step for all tokens leaving the node. Before leaving a node the
//! tokens are recombined by history suffix and pruned by beam and count.
//! The tokens that reach the final node, after an end-of-sentence step, are
//! the result.

mod propagate;
mod prune;
#[cfg(test)]
mod testutil;
mod token;
mod unk;


use tracing::{debug, debug_span};

use crate::evaluator::{EvaluatorError, StepEvaluator};
use crate::interpolate::Interpolation;
use crate::lattice::{Lattice, LatticeError, NodeId};
use crate::settings::{ConfigError, DecoderConfig};
use crate::state::RecurrentState;
use crate::vocabulary::{Vocabulary, WordId, SENTENCE_END, SENTENCE_START, UNKNOWN_WORD};

pub use token::{HistoryWord, Token, TokenDisplay};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("node {node} has no tokens when it is processed")]
    UnreachableNode { node: NodeId },

    #[error("could not reach the final node of the word lattice")]
    FinalNodeUnreachable,

    #[error("invalid lattice: {0}")]
    Lattice(#[from] LatticeError),

    #[error("network evaluation failed: {0}")]
    Evaluator(#[from] EvaluatorError),
}

/// Decodes lattices with a fixed network, vocabulary, and configuration.
///
/// The decoder itself is never mutated by `decode`, so one instance can
/// decode any number of lattices, and several instances can share one
/// evaluator across threads.
pub struct LatticeDecoder<'a> {
    evaluator: &'a dyn StepEvaluator,
    vocabulary: &'a Vocabulary,
    config: DecoderConfig,
    interpolation: Interpolation,
    /// Out-of-shortlist log-probability per word id, when shortlist
    /// redistribution is active.
    oos_logprobs: Option<Vec<f64>>,
    sos_id: WordId,
    eos_id: WordId,
    unk_id: WordId,
}

/// Bookkeeping of a single `decode` call.
struct DecodeState<'l> {
    lattice: &'l Lattice,
    sorted_nodes: Vec<NodeId>,
    tokens: Vec<Vec<Token>>,
    /// Best total log-probability of any token that has reached each node.
    best_logprob: Vec<Option<f64>>,
    lm_scale: f64,
    wi_penalty: f64,
}

impl DecodeState<'_> {
    fn update_best(&mut self, node: NodeId, logprob: f64) {
        let best = &mut self.best_logprob[node];
        if best.map_or(true, |b| logprob > b) {
            *best = Some(logprob);
        }
    }

    /// Best log-probability among nodes at the same or a later time than
    /// the node at `position` in the sorted order. Untimed nodes use their
    /// position as the time.
    fn window_best_logprob(&self, node: NodeId, position: usize) -> Option<f64> {
        let begin = match self.lattice.node(node).time {
            None => position,
            Some(time) => self
                .sorted_nodes
                .iter()
                .position(|&id| self.lattice.node(id).time.is_some_and(|t| t >= time))
                .unwrap_or(position),
        };
        self.sorted_nodes[begin..]
            .iter()
            .filter_map(|&id| self.best_logprob[id])
            .max_by(f64::total_cmp)
    }
}

impl<'a> LatticeDecoder<'a> {
    pub fn new(
        evaluator: &'a dyn StepEvaluator,
        vocabulary: &'a Vocabulary,
        config: DecoderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let special = |word: &'static str| {
            vocabulary
                .word_to_id(word)
                .ok_or(ConfigError::MissingSpecialWord(word))
        };
        let sos_id = special(SENTENCE_START)?;
        let eos_id = special(SENTENCE_END)?;
        let unk_id = special(UNKNOWN_WORD)?;

        let oos_logprobs = if config.use_shortlist {
            let oos = vocabulary.oos_logprobs();
            if oos.is_none() {
                debug!("no unigram statistics for out-of-shortlist words, shortlist disabled");
            }
            oos
        } else {
            None
        };

        Ok(Self {
            evaluator,
            vocabulary,
            interpolation: Interpolation::from_linear_flag(config.linear_interpolation),
            config,
            oos_logprobs,
            sos_id,
            eos_id,
            unk_id,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.vocabulary
    }

    /// True when `<unk>` probability is redistributed by unigram counts.
    pub fn shortlist_active(&self) -> bool {
        self.oos_logprobs.is_some()
    }

    /// Decode a lattice and return the tokens of the final node, best first.
    pub fn decode(&self, lattice: &Lattice) -> Result<Vec<Token>, DecodeError> {
        let lm_scale = self.config.lm_scale.or(lattice.lm_scale).unwrap_or(1.0);
        let wi_penalty = self.config.wi_penalty.or(lattice.wi_penalty).unwrap_or(0.0);
        let initial_node = lattice.initial_node()?;
        let final_node = lattice.final_node()?;
        let _span = debug_span!(
            "decode",
            utterance = lattice.utterance_id.as_deref().unwrap_or(""),
            nodes = lattice.num_nodes(),
            links = lattice.num_links()
        )
        .entered();

        let mut state = DecodeState {
            lattice,
            sorted_nodes: lattice.sorted_nodes()?,
            tokens: vec![Vec::new(); lattice.num_nodes()],
            best_logprob: vec![None; lattice.num_nodes()],
            lm_scale,
            wi_penalty,
        };

        let mut initial_token = Token::new(
            vec![HistoryWord::Id(self.sos_id)],
            RecurrentState::zeros(self.evaluator.state_sizes()),
        );
        self.finalize(&mut initial_token, &state);
        state.update_best(initial_node, initial_token.total());
        state.tokens[initial_node].push(initial_token);

        let num_sorted = state.sorted_nodes.len();
        let report_every = num_sorted.div_ceil(20).max(1);
        for position in 0..num_sorted {
            let node = state.sorted_nodes[position];
            let node_tokens = std::mem::take(&mut state.tokens[node]);
            if node_tokens.is_empty() {
                if node == final_node {
                    return Err(DecodeError::FinalNodeUnreachable);
                }
                return Err(DecodeError::UnreachableNode { node });
            }
            let num_before = node_tokens.len();
            let beam_threshold = match self.config.beam {
                Some(beam) => state
                    .window_best_logprob(node, position)
                    .map(|best| best - beam),
                None => None,
            };
            let node_tokens =
                prune::prune(node_tokens, beam_threshold, self.config.max_tokens_per_node);
            let num_pruned = num_before - node_tokens.len();

            if node == final_node {
                let mut final_tokens = self.propagate(&node_tokens, None, &mut state)?;
                final_tokens.sort_by(|a, b| b.total().total_cmp(&a.total()));
                debug!(
                    tokens = final_tokens.len(),
                    best = final_tokens.first().map(Token::total)
                );
                return Ok(final_tokens);
            }

            let mut num_new = 0;
            for &link_id in &lattice.node(node).out_links {
                let link = lattice.link(link_id);
                let new_tokens = self.propagate(&node_tokens, Some(link), &mut state)?;
                num_new += new_tokens.len();
                state.tokens[link.end_node].extend(new_tokens);
            }

            let processed = position + 1;
            if processed % report_every == 0 {
                let percent = processed as f64 / num_sorted as f64 * 100.0;
                debug!(
                    processed,
                    percent,
                    tokens = node_tokens.len(),
                    new = num_new,
                    pruned = num_pruned,
                );
            }
        }

        Err(DecodeError::FinalNodeUnreachable)
    }

    /// Recompute the recombination hash and total score of a token.
    fn finalize(&self, token: &mut Token, state: &DecodeState<'_>) {
        token.recompute_hash(self.config.recombination_order);
        token.recompute_total(
            self.config.nnlm_weight,
            state.lm_scale,
            state.wi_penalty,
            self.interpolation,
        );
    }
}

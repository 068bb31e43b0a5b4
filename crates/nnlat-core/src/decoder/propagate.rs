use tracing::debug;

use super::token::{HistoryWord, Token};
use super::{DecodeError, DecodeState, LatticeDecoder};
use crate::evaluator::{EvaluatorError, StepInput};
use crate::lattice::Link;
use crate::state::{BatchState, RecurrentState};

impl LatticeDecoder<'_> {
    /// Copy `tokens` along `link`, or through end of sentence when `link` is
    /// `None`.
    ///
    /// Null links (`!NULL`, `!ENTER`, ...) add their acoustic and lattice LM
    /// scores but append no word and run no network step. The end node's
    /// best log-probability is raised for the beam.
    pub(super) fn propagate(
        &self,
        tokens: &[Token],
        link: Option<&Link>,
        state: &mut DecodeState<'_>,
    ) -> Result<Vec<Token>, DecodeError> {
        let mut new_tokens: Vec<Token> = tokens.iter().map(Token::copy).collect();

        match link {
            None => self.append_word(&mut new_tokens, HistoryWord::Id(self.eos_id), None)?,
            Some(link) => {
                for token in &mut new_tokens {
                    if let Some(ac_logprob) = link.ac_logprob {
                        token.ac_logprob += ac_logprob;
                    }
                    if let Some(lm_logprob) = link.lm_logprob {
                        token.lat_lm_logprob += lm_logprob;
                    }
                }
                if !link.is_null() {
                    let word = match self.vocabulary.word_to_id(&link.word) {
                        Some(id) => HistoryWord::Id(id),
                        None => {
                            debug!(word = link.word.as_str(), "out-of-vocabulary lattice word");
                            HistoryWord::Literal(link.word.clone())
                        }
                    };
                    let oov_logprob = if self.config.unk_from_lattice {
                        link.lm_logprob
                    } else {
                        self.config.unk_penalty
                    };
                    self.append_word(&mut new_tokens, word, oov_logprob)?;
                }
            }
        }

        for token in &mut new_tokens {
            self.finalize(token, state);
            if let Some(link) = link {
                state.update_best(link.end_node, token.total());
            }
        }
        Ok(new_tokens)
    }

    /// Append `target` to every token and add its network log-probability,
    /// evaluating all tokens in one batch.
    ///
    /// The class-membership log-probability of each token's input word is
    /// added to its row before `<unk>` handling. Each token receives its own
    /// slice of the output state.
    pub(super) fn append_word(
        &self,
        tokens: &mut [Token],
        target: HistoryWord,
        oov_logprob: Option<f64>,
    ) -> Result<(), DecodeError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let batch_size = tokens.len();

        let prev_word_ids: Vec<u32> = tokens
            .iter()
            .map(|t| self.limit_to_shortlist(t.history.last()))
            .collect();
        let prev_class_ids = prev_word_ids
            .iter()
            .map(|&id| self.vocabulary.class_id(id))
            .collect();
        let membership_logprobs: Vec<f64> = prev_word_ids
            .iter()
            .map(|&id| self.vocabulary.membership_logprob(id))
            .collect();
        let target_id = self.limit_to_shortlist(Some(&target));
        let target_class_id = self.vocabulary.class_id(target_id);

        let states: Vec<&RecurrentState> = tokens.iter().map(|t| &t.state).collect();
        let batch_state = BatchState::combine(&states, self.evaluator.state_sizes())
            .map_err(EvaluatorError::from)?;
        let input = StepInput {
            prev_word_ids,
            prev_class_ids,
            target_class_ids: vec![target_class_id; batch_size],
            state: batch_state,
        };
        let output = self.evaluator.evaluate(&input)?;
        for (field, len) in [
            ("logprobs", output.logprobs.len()),
            ("output state", output.state.batch_size()),
        ] {
            if len != batch_size {
                return Err(EvaluatorError::BatchMismatch {
                    field,
                    expected: batch_size,
                    actual: len,
                }
                .into());
            }
        }

        for (row, token) in tokens.iter_mut().enumerate() {
            token.history.push(target.clone());
            token.state = output.state.slice(row);
            let network_logprob = f64::from(output.logprobs[row]) + membership_logprobs[row];
            token.nn_lm_logprob +=
                self.handle_unk_logprob(&target, network_logprob, oov_logprob);
        }
        Ok(())
    }
}

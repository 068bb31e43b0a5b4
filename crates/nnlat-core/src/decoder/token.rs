use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::interpolate::Interpolation;
use crate::state::RecurrentState;
use crate::vocabulary::{Vocabulary, WordId, UNKNOWN_WORD};

/// One entry of a token's word history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HistoryWord {
    /// A vocabulary word.
    Id(WordId),
    /// An out-of-vocabulary lattice word, kept verbatim for the transcript.
    Literal(String),
}

impl HistoryWord {
    pub fn id(&self) -> Option<WordId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }
}

/// A partial path through a lattice.
///
/// `recombination_hash`, `lm_logprob`, and `total_logprob` are derived
/// values. They are unset on new and copied tokens and must be recomputed
/// after every change, before the token is compared or pruned.
#[derive(Debug, Clone)]
pub struct Token {
    pub history: Vec<HistoryWord>,
    pub state: RecurrentState,
    /// Sum of acoustic log-probabilities of the traversed links.
    pub ac_logprob: f64,
    /// Sum of lattice LM log-probabilities of the traversed links.
    pub lat_lm_logprob: f64,
    /// Sum of network LM log-probabilities of the appended words.
    pub nn_lm_logprob: f64,
    pub recombination_hash: Option<u64>,
    pub lm_logprob: Option<f64>,
    pub total_logprob: Option<f64>,
}

impl Token {
    pub fn new(history: Vec<HistoryWord>, state: RecurrentState) -> Self {
        Self {
            history,
            state,
            ac_logprob: 0.0,
            lat_lm_logprob: 0.0,
            nn_lm_logprob: 0.0,
            recombination_hash: None,
            lm_logprob: None,
            total_logprob: None,
        }
    }

    /// Copy for propagation along another link.
    ///
    /// The history gets its own storage; the recurrent state is shared until
    /// the copy appends a word. Derived values are not carried over.
    pub fn copy(&self) -> Self {
        Self {
            history: self.history.clone(),
            state: self.state.clone(),
            ac_logprob: self.ac_logprob,
            lat_lm_logprob: self.lat_lm_logprob,
            nn_lm_logprob: self.nn_lm_logprob,
            recombination_hash: None,
            lm_logprob: None,
            total_logprob: None,
        }
    }

    /// Hash the last `order` history words, or the whole history when
    /// `order` is `None`.
    ///
    /// Tokens with equal hashes are recombined without comparing the
    /// histories themselves, so a collision merges two different contexts.
    pub fn recompute_hash(&mut self, order: Option<usize>) {
        let suffix = match order {
            Some(order) => &self.history[self.history.len().saturating_sub(order)..],
            None => &self.history[..],
        };
        let mut hasher = DefaultHasher::new();
        suffix.hash(&mut hasher);
        self.recombination_hash = Some(hasher.finish());
    }

    /// Interpolate the LM scores and compute
    /// `ac + lm * lm_scale + wi_penalty * len(history)`.
    pub fn recompute_total(
        &mut self,
        nn_weight: f64,
        lm_scale: f64,
        wi_penalty: f64,
        interpolation: Interpolation,
    ) {
        let lm_logprob = interpolation.apply(self.nn_lm_logprob, self.lat_lm_logprob, nn_weight);
        self.lm_logprob = Some(lm_logprob);
        self.total_logprob = Some(
            self.ac_logprob + lm_logprob * lm_scale + wi_penalty * self.history.len() as f64,
        );
    }

    /// Total log-probability of a finalized token.
    pub fn total(&self) -> f64 {
        debug_assert!(self.total_logprob.is_some(), "token compared before recompute_total");
        self.total_logprob.unwrap_or(f64::NEG_INFINITY)
    }

    /// The history as words. Literal entries pass through unchanged.
    pub fn history_words<'a>(&'a self, vocabulary: &'a Vocabulary) -> Vec<&'a str> {
        self.history
            .iter()
            .map(|word| match word {
                HistoryWord::Id(id) => vocabulary.id_to_word(*id).unwrap_or(UNKNOWN_WORD),
                HistoryWord::Literal(text) => text.as_str(),
            })
            .collect()
    }

    /// Display adapter that shows words instead of ids.
    pub fn display<'a>(&'a self, vocabulary: &'a Vocabulary) -> TokenDisplay<'a> {
        TokenDisplay {
            token: self,
            vocabulary: Some(vocabulary),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        TokenDisplay {
            token: self,
            vocabulary: None,
        }
        .fmt(f)
    }
}

pub struct TokenDisplay<'a> {
    token: &'a Token,
    vocabulary: Option<&'a Vocabulary>,
}

impl fmt::Display for TokenDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.token;
        let history: Vec<String> = match self.vocabulary {
            Some(vocabulary) => t
                .history_words(vocabulary)
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => t
                .history
                .iter()
                .map(|word| match word {
                    HistoryWord::Id(id) => id.to_string(),
                    HistoryWord::Literal(text) => text.clone(),
                })
                .collect(),
        };
        write!(
            f,
            "[{}]  acoustic: {:.2}  lattice LM: {:.2}  NNLM: {:.2}",
            history.join(" "),
            t.ac_logprob,
            t.lat_lm_logprob,
            t.nn_lm_logprob
        )?;
        if let Some(total) = t.total_logprob {
            write!(f, "  total: {total:.2}")?;
        }
        Ok(())
    }
}

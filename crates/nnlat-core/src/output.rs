//! Text rendering of decoded tokens.

use std::fmt;
use std::str::FromStr;

use crate::decoder::Token;
use crate::vocabulary::{Vocabulary, SENTENCE_END, SENTENCE_START};

#[derive(Debug, thiserror::Error)]
#[error("unknown output format `{0}` (expected ref, trn or full)")]
pub struct UnknownFormat(String);

/// Line format for a decoded hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `utt w1 w2 ...`
    #[default]
    Ref,
    /// `w1 w2 ... (utt)`
    Trn,
    /// `utt ac lm num_words w1 w2 ...`, scores divided by the log scale.
    Full,
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ref" => Ok(Self::Ref),
            "trn" => Ok(Self::Trn),
            "full" | "n-best" => Ok(Self::Full),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ref => "ref",
            Self::Trn => "trn",
            Self::Full => "full",
        })
    }
}

impl OutputFormat {
    /// Render one line (without the trailing newline).
    ///
    /// `log_scale` is `ln(base)` of the requested output log base, or 1.0
    /// for natural logarithms.
    pub fn render(
        self,
        token: &Token,
        vocabulary: &Vocabulary,
        utterance_id: &str,
        log_scale: f64,
    ) -> String {
        let words = sentence_words(token, vocabulary);
        let text = words.join(" ");
        match self {
            Self::Ref => join_nonempty(utterance_id, &text),
            Self::Trn => join_nonempty(&text, &format!("({utterance_id})")),
            Self::Full => {
                let ac = token.ac_logprob / log_scale;
                let lm = token.lm_logprob.unwrap_or(f64::NEG_INFINITY) / log_scale;
                let head = format!("{utterance_id} {ac} {lm} {}", words.len());
                join_nonempty(&head, &text)
            }
        }
    }
}

/// History words of a token without the sentence start and end markers.
pub fn sentence_words<'a>(token: &'a Token, vocabulary: &'a Vocabulary) -> Vec<&'a str> {
    token
        .history_words(vocabulary)
        .into_iter()
        .filter(|w| *w != SENTENCE_START && *w != SENTENCE_END)
        .collect()
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (_, true) => a.to_string(),
        (true, false) => b.to_string(),
        (false, false) => format!("{a} {b}"),
    }
}

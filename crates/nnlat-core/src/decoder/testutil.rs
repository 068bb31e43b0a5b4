#![cfg(test)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use crate::evaluator::{EvaluatorError, StepEvaluator, StepInput, StepOutput};
use crate::lattice::Lattice;
use crate::state::BatchState;
use crate::vocabulary::{Vocabulary, VocabularyBuilder, WordId};

/// Deterministic step evaluator for decoder tests.
///
/// Log-probabilities come from a `(prev_word_id, target_class_id)` table with
/// a default. The single state value counts the steps a sequence has taken.
pub struct TableEvaluator {
    default_logprob: f32,
    table: HashMap<(u32, u32), f32>,
    batch_sizes: Mutex<Vec<usize>>,
    fail: bool,
    sizes: Vec<usize>,
}

impl TableEvaluator {
    pub fn new(default_logprob: f32) -> Self {
        Self {
            default_logprob,
            table: HashMap::new(),
            batch_sizes: Mutex::new(Vec::new()),
            fail: false,
            sizes: vec![1],
        }
    }

    pub fn with(mut self, prev_word: WordId, target_class: u32, logprob: f32) -> Self {
        self.table.insert((prev_word, target_class), logprob);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0.0)
        }
    }

    /// Batch size of every `evaluate` call so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl StepEvaluator for TableEvaluator {
    fn state_sizes(&self) -> &[usize] {
        &self.sizes
    }

    fn evaluate(&self, input: &StepInput) -> Result<StepOutput, EvaluatorError> {
        input.validate()?;
        if self.fail {
            return Err(EvaluatorError::Backend("simulated failure".to_string()));
        }
        self.batch_sizes.lock().unwrap().push(input.batch_size());

        let logprobs = input
            .prev_word_ids
            .iter()
            .zip(&input.target_class_ids)
            .map(|(&prev, &target)| {
                self.table
                    .get(&(prev, target))
                    .copied()
                    .unwrap_or(self.default_logprob)
            })
            .collect();
        let steps: Vec<f32> = input.state.rows(0).iter().map(|s| s + 1.0).collect();
        let state = BatchState::from_rows(input.batch_size(), self.sizes.clone(), vec![steps])?;
        Ok(StepOutput { logprobs, state })
    }
}

/// `<s> </s> <unk> a b c`, one class per word, so class id == word id.
pub fn test_vocabulary() -> Vocabulary {
    Vocabulary::from_words(&["<s>", "</s>", "<unk>", "a", "b", "c"]).unwrap()
}

pub struct OosIds {
    pub unk: WordId,
    pub the: WordId,
    pub rare: WordId,
    pub rarer: WordId,
}

/// Vocabulary with two out-of-shortlist words and unigram counts 3 and 1.
pub fn oos_vocabulary() -> (Vocabulary, OosIds) {
    let mut builder = VocabularyBuilder::new();
    builder.add_word("<s>").unwrap();
    builder.add_word("</s>").unwrap();
    let unk = builder.add_word("<unk>").unwrap();
    let the = builder.add_word("the").unwrap();
    let rare = builder.add_out_of_shortlist("rare").unwrap();
    let rarer = builder.add_out_of_shortlist("rarer").unwrap();
    let mut vocab = builder.build().unwrap();
    vocab
        .read_unigram_counts(Cursor::new("the 50\nrare 3\nrarer 1\n"))
        .unwrap();
    (
        vocab,
        OosIds {
            unk,
            the,
            rare,
            rarer,
        },
    )
}

/// Linear lattice `0 -w1-> 1 -w2-> ... -> n` with the given link scores.
pub fn chain(links: &[(&str, Option<f64>, Option<f64>)]) -> Lattice {
    let mut lattice = Lattice::new();
    let mut prev = lattice.add_node(None);
    lattice.set_initial_node(prev);
    for &(word, ac, lm) in links {
        let next = lattice.add_node(None);
        lattice.add_link(prev, next, word, ac, lm).unwrap();
        prev = next;
    }
    lattice.set_final_node(prev);
    lattice
}

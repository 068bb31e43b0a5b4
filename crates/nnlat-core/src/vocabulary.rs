//! Word vocabulary with word classes, shortlist, and unigram statistics.
//!
//! Ids are assigned in insertion order. Shortlist words are the ones the
//! network predicts directly; every other word is predicted through `<unk>`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub type WordId = u32;
pub type ClassId = u32;

pub const SENTENCE_START: &str = "<s>";
pub const SENTENCE_END: &str = "</s>";
pub const UNKNOWN_WORD: &str = "<unk>";

/// Marker line in a vocabulary file; words after it are out of shortlist.
pub const SHORTLIST_END_MARKER: &str = "#shortlist-end";

#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("duplicate word: {0}")]
    DuplicateWord(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("class {class} of word {word} has non-positive membership probability")]
    InvalidMembership { word: String, class: ClassId },
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    id_to_word: Vec<String>,
    word_to_id: HashMap<String, WordId>,
    word_classes: Vec<ClassId>,
    membership_logprobs: Vec<f64>,
    in_shortlist: Vec<bool>,
    num_classes: usize,
    unigram_counts: Option<Vec<u64>>,
}

impl Vocabulary {
    /// One class per word, every word in the shortlist.
    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Result<Self, VocabularyError> {
        let mut builder = VocabularyBuilder::new();
        for word in words {
            builder.add_word(word.as_ref())?;
        }
        builder.build()
    }

    /// Read a vocabulary file: one `word` or `word class_id [membership_prob]`
    /// per line. Blank lines and lines starting with `#` are skipped, except
    /// the shortlist end marker.
    pub fn read<R: BufRead>(reader: R) -> Result<Self, VocabularyError> {
        let mut builder = VocabularyBuilder::new();
        let mut shortlist = true;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line == SHORTLIST_END_MARKER {
                shortlist = false;
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_err = |reason: String| VocabularyError::Parse {
                line: index + 1,
                reason,
            };
            let mut fields = line.split_whitespace();
            let word = fields.next().unwrap_or_default();
            let class = fields
                .next()
                .map(|f| f.parse::<ClassId>())
                .transpose()
                .map_err(|e| parse_err(format!("invalid class id: {e}")))?;
            let prob = fields
                .next()
                .map(|f| f.parse::<f64>())
                .transpose()
                .map_err(|e| parse_err(format!("invalid membership probability: {e}")))?;
            if fields.next().is_some() {
                return Err(parse_err("too many fields".to_string()));
            }
            match (shortlist, class) {
                (false, _) => builder.add_out_of_shortlist(word)?,
                (true, Some(class)) => builder.add_word_in_class(word, class, prob.unwrap_or(1.0))?,
                (true, None) => builder.add_word(word)?,
            };
        }
        builder.build()
    }

    pub fn open(path: &Path) -> Result<Self, VocabularyError> {
        Self::read(BufReader::new(File::open(path)?))
    }

    /// Read `word count` lines and attach the counts. Words not in the
    /// vocabulary are ignored; vocabulary words missing from the file get 0.
    pub fn read_unigram_counts<R: BufRead>(&mut self, reader: R) -> Result<(), VocabularyError> {
        let mut counts = vec![0u64; self.num_words()];
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(word), Some(count), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(VocabularyError::Parse {
                    line: index + 1,
                    reason: "expected `word count`".to_string(),
                });
            };
            let count: u64 = count.parse().map_err(|e| VocabularyError::Parse {
                line: index + 1,
                reason: format!("invalid count: {e}"),
            })?;
            if let Some(id) = self.word_to_id(word) {
                counts[id as usize] = count;
            }
        }
        self.unigram_counts = Some(counts);
        Ok(())
    }

    pub fn open_unigram_counts(&mut self, path: &Path) -> Result<(), VocabularyError> {
        self.read_unigram_counts(BufReader::new(File::open(path)?))
    }

    pub fn set_unigram_counts(&mut self, counts: &HashMap<String, u64>) {
        let mut table = vec![0u64; self.num_words()];
        for (word, &count) in counts {
            if let Some(id) = self.word_to_id(word) {
                table[id as usize] = count;
            }
        }
        self.unigram_counts = Some(table);
    }

    pub fn num_words(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn word_to_id(&self, word: &str) -> Option<WordId> {
        self.word_to_id.get(word).copied()
    }

    pub fn id_to_word(&self, id: WordId) -> Option<&str> {
        self.id_to_word.get(id as usize).map(String::as_str)
    }

    /// Class of a word id. Out-of-shortlist words share the class of `<unk>`.
    pub fn class_id(&self, id: WordId) -> ClassId {
        self.word_classes.get(id as usize).copied().unwrap_or(0)
    }

    /// Log-probability of the word within its class.
    pub fn membership_logprob(&self, id: WordId) -> f64 {
        self.membership_logprobs
            .get(id as usize)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn in_shortlist(&self, id: WordId) -> bool {
        self.in_shortlist.get(id as usize).copied().unwrap_or(false)
    }

    pub fn has_unigram_counts(&self) -> bool {
        self.unigram_counts.is_some()
    }

    /// Per word id, the log of the word's share of the unigram mass of all
    /// out-of-shortlist words; 0.0 for shortlist words.
    ///
    /// Returns `None` without unigram counts or when the out-of-shortlist
    /// words have no mass at all.
    pub fn oos_logprobs(&self) -> Option<Vec<f64>> {
        let counts = self.unigram_counts.as_ref()?;
        let total: u64 = counts
            .iter()
            .zip(&self.in_shortlist)
            .filter(|&(_, &shortlist)| !shortlist)
            .map(|(&count, _)| count)
            .sum();
        if total == 0 {
            return None;
        }
        let total = total as f64;
        Some(
            counts
                .iter()
                .zip(&self.in_shortlist)
                .map(|(&count, &shortlist)| {
                    if shortlist {
                        0.0
                    } else {
                        (count as f64 / total).ln()
                    }
                })
                .collect(),
        )
    }
}

struct PendingWord {
    word: String,
    class: Option<(ClassId, f64)>,
    shortlist: bool,
}

/// Incremental vocabulary construction.
#[derive(Default)]
pub struct VocabularyBuilder {
    words: Vec<PendingWord>,
    seen: HashMap<String, WordId>,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shortlist word in a class of its own.
    pub fn add_word(&mut self, word: &str) -> Result<WordId, VocabularyError> {
        self.push(word, None, true)
    }

    /// Add a shortlist word to `class` with an unnormalized membership
    /// probability.
    pub fn add_word_in_class(
        &mut self,
        word: &str,
        class: ClassId,
        prob: f64,
    ) -> Result<WordId, VocabularyError> {
        if prob.is_nan() || prob <= 0.0 {
            return Err(VocabularyError::InvalidMembership {
                word: word.to_string(),
                class,
            });
        }
        self.push(word, Some((class, prob)), true)
    }

    pub fn add_out_of_shortlist(&mut self, word: &str) -> Result<WordId, VocabularyError> {
        self.push(word, None, false)
    }

    fn push(
        &mut self,
        word: &str,
        class: Option<(ClassId, f64)>,
        shortlist: bool,
    ) -> Result<WordId, VocabularyError> {
        if self.seen.contains_key(word) {
            return Err(VocabularyError::DuplicateWord(word.to_string()));
        }
        let id = self.words.len() as WordId;
        self.seen.insert(word.to_string(), id);
        self.words.push(PendingWord {
            word: word.to_string(),
            class,
            shortlist,
        });
        Ok(id)
    }

    pub fn build(self) -> Result<Vocabulary, VocabularyError> {
        let mut next_class = self
            .words
            .iter()
            .filter_map(|w| w.class.map(|(class, _)| class + 1))
            .max()
            .unwrap_or(0);

        // Class assignment for shortlist words; out-of-shortlist words are
        // resolved after `<unk>` has its class.
        let mut classes: Vec<Option<(ClassId, f64)>> = Vec::with_capacity(self.words.len());
        for w in &self.words {
            let class = match (w.shortlist, w.class) {
                (false, _) => None,
                (true, Some(class)) => Some(class),
                (true, None) => {
                    let class = (next_class, 1.0);
                    next_class += 1;
                    Some(class)
                }
            };
            classes.push(class);
        }

        let mut class_mass: HashMap<ClassId, f64> = HashMap::new();
        for (class, prob) in classes.iter().flatten() {
            *class_mass.entry(*class).or_default() += prob;
        }

        let unk_class = self
            .seen
            .get(UNKNOWN_WORD)
            .and_then(|&id| classes[id as usize])
            .map(|(class, _)| class)
            .unwrap_or(0);

        let mut word_classes = Vec::with_capacity(self.words.len());
        let mut membership_logprobs = Vec::with_capacity(self.words.len());
        let mut in_shortlist = Vec::with_capacity(self.words.len());
        for (w, class) in self.words.iter().zip(&classes) {
            match class {
                Some((class, prob)) => {
                    word_classes.push(*class);
                    membership_logprobs.push((prob / class_mass[class]).ln());
                }
                None => {
                    word_classes.push(unk_class);
                    membership_logprobs.push(0.0);
                }
            }
            in_shortlist.push(w.shortlist);
        }

        Ok(Vocabulary {
            id_to_word: self.words.into_iter().map(|w| w.word).collect(),
            word_to_id: self.seen,
            word_classes,
            membership_logprobs,
            in_shortlist,
            num_classes: next_class as usize,
            unigram_counts: None,
        })
    }
}

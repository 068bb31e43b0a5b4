use tracing::debug;

use super::token::HistoryWord;
use super::LatticeDecoder;
use crate::vocabulary::WordId;

impl LatticeDecoder<'_> {
    /// Network input id for a word: the word itself when it is in the
    /// shortlist, `<unk>` otherwise.
    pub(super) fn limit_to_shortlist(&self, word: Option<&HistoryWord>) -> WordId {
        match word {
            Some(HistoryWord::Id(id)) if self.vocabulary.in_shortlist(*id) => *id,
            _ => self.unk_id,
        }
    }

    /// Final log-probability of `word` after `<unk>` handling.
    ///
    /// With shortlist redistribution, vocabulary words get their share of
    /// the `<unk>` mass added (zero for shortlist words) and OOV words take
    /// `oov_logprob` when given. Without it, any word outside the shortlist
    /// takes `oov_logprob` when given. Everything else keeps the network
    /// score.
    pub(super) fn handle_unk_logprob(
        &self,
        word: &HistoryWord,
        network_logprob: f64,
        oov_logprob: Option<f64>,
    ) -> f64 {
        let in_shortlist = word.id().is_some_and(|id| self.vocabulary.in_shortlist(id));

        match (&self.oos_logprobs, word, oov_logprob) {
            (Some(oos_logprobs), HistoryWord::Id(id), _) => {
                network_logprob + oos_logprobs.get(*id as usize).copied().unwrap_or(0.0)
            }
            (Some(_), HistoryWord::Literal(_), Some(oov_logprob)) => {
                debug!(network_logprob, oov_logprob, "replacing <unk> logprob");
                oov_logprob
            }
            (None, _, Some(oov_logprob)) if !in_shortlist => {
                debug!(network_logprob, oov_logprob, "replacing <unk> logprob");
                oov_logprob
            }
            _ => network_logprob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::{oos_vocabulary, TableEvaluator};
    use crate::settings::DecoderConfig;

    fn decoder<'a>(
        evaluator: &'a TableEvaluator,
        vocab: &'a crate::vocabulary::Vocabulary,
        use_shortlist: bool,
    ) -> LatticeDecoder<'a> {
        let mut config = DecoderConfig::new(1.0);
        config.use_shortlist = use_shortlist;
        LatticeDecoder::new(evaluator, vocab, config).unwrap()
    }

    #[test]
    fn shortlist_word_keeps_network_score() {
        let (vocab, ids) = oos_vocabulary();
        let evaluator = TableEvaluator::new(-2.0);
        for use_shortlist in [false, true] {
            let d = decoder(&evaluator, &vocab, use_shortlist);
            let got = d.handle_unk_logprob(&HistoryWord::Id(ids.the), -2.0, Some(-30.0));
            assert_eq!(got, -2.0);
        }
    }

    #[test]
    fn redistribution_adds_unigram_share() {
        let (vocab, ids) = oos_vocabulary();
        let evaluator = TableEvaluator::new(-2.0);
        let d = decoder(&evaluator, &vocab, true);
        assert!(d.shortlist_active());
        // rare has 3 of the 4 out-of-shortlist counts.
        let got = d.handle_unk_logprob(&HistoryWord::Id(ids.rare), -2.0, Some(-30.0));
        assert!((got - (-2.0 + 0.75f64.ln())).abs() < 1e-12);
        let got = d.handle_unk_logprob(&HistoryWord::Id(ids.rarer), -2.0, None);
        assert!((got - (-2.0 + 0.25f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn redistribution_uses_override_for_oov_literal() {
        let (vocab, _) = oos_vocabulary();
        let evaluator = TableEvaluator::new(-2.0);
        let d = decoder(&evaluator, &vocab, true);
        let oov = HistoryWord::Literal("zyzzyva".into());
        assert_eq!(d.handle_unk_logprob(&oov, -2.0, Some(-30.0)), -30.0);
        assert_eq!(d.handle_unk_logprob(&oov, -2.0, None), -2.0);
    }

    #[test]
    fn without_redistribution_override_replaces_out_of_shortlist() {
        let (vocab, ids) = oos_vocabulary();
        let evaluator = TableEvaluator::new(-2.0);
        let d = decoder(&evaluator, &vocab, false);
        assert!(!d.shortlist_active());
        let rare = HistoryWord::Id(ids.rare);
        let oov = HistoryWord::Literal("zyzzyva".into());
        assert_eq!(d.handle_unk_logprob(&rare, -2.0, Some(-30.0)), -30.0);
        assert_eq!(d.handle_unk_logprob(&oov, -2.0, Some(-30.0)), -30.0);
        assert_eq!(d.handle_unk_logprob(&rare, -2.0, None), -2.0);
    }

    #[test]
    fn shortlist_without_unigrams_is_disabled() {
        let vocab = crate::vocabulary::Vocabulary::from_words(&["<s>", "</s>", "<unk>"]).unwrap();
        let evaluator = TableEvaluator::new(-2.0);
        let d = decoder(&evaluator, &vocab, true);
        assert!(!d.shortlist_active());
    }

    #[test]
    fn limit_to_shortlist_maps_to_unk() {
        let (vocab, ids) = oos_vocabulary();
        let evaluator = TableEvaluator::new(-2.0);
        let d = decoder(&evaluator, &vocab, false);
        assert_eq!(d.limit_to_shortlist(Some(&HistoryWord::Id(ids.the))), ids.the);
        assert_eq!(d.limit_to_shortlist(Some(&HistoryWord::Id(ids.rare))), ids.unk);
        assert_eq!(
            d.limit_to_shortlist(Some(&HistoryWord::Literal("x".into()))),
            ids.unk
        );
        assert_eq!(d.limit_to_shortlist(None), ids.unk);
    }
}

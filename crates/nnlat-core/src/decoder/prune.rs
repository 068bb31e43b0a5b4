use std::collections::HashMap;

use super::token::Token;

/// Recombine, sort, and prune the tokens of one node.
///
/// `beam_threshold` is the best log-probability in the node's time window
/// minus the beam. Tokens at or below it are dropped, except the best token,
/// which survives even when the threshold was computed from a stale best
/// score.
pub(super) fn prune(
    tokens: Vec<Token>,
    beam_threshold: Option<f64>,
    max_tokens: Option<usize>,
) -> Vec<Token> {
    let mut tokens = recombine(tokens);
    tokens.sort_by(|a, b| b.total().total_cmp(&a.total()));

    if let Some(threshold) = beam_threshold {
        let keep = tokens
            .iter()
            .skip(1)
            .position(|t| t.total() <= threshold)
            .map_or(tokens.len(), |index| index + 1);
        tokens.truncate(keep);
    }

    if let Some(max_tokens) = max_tokens {
        tokens.truncate(max_tokens);
    }
    tokens
}

/// Keep the best token of every recombination hash, in first-seen order.
///
/// Equal hashes are treated as equal history suffixes; the histories are not
/// compared.
fn recombine(tokens: Vec<Token>) -> Vec<Token> {
    let mut slots: HashMap<Option<u64>, usize> = HashMap::with_capacity(tokens.len());
    let mut kept: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match slots.get(&token.recombination_hash) {
            Some(&index) => {
                if token.total() > kept[index].total() {
                    kept[index] = token;
                }
            }
            None => {
                slots.insert(token.recombination_hash, kept.len());
                kept.push(token);
            }
        }
    }
    kept
}

//! The merge loop.
//!
//! This is inherently sequential: each merge is chosen from the pair counts left behind by the
//! previous one.  Choosing the next pair uses a max-heap with lazy invalidation; whenever a pair's
//! count changes a fresh entry is pushed, and entries whose count no longer matches the
//! [`PairIndex`] are discarded when they reach the top.
use crate::counts::PretokenCounts;
use crate::pair_index::PairIndex;
use crate::token::{Pair, TokenString};
use crate::vocab::{MergeRule, Vocabulary, VocabularyBuilder};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::*;

/// A pair that may be the next one to merge, as of when it was pushed on the heap.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    count: u64,

    /// The left token's bytes followed by the right token's bytes
    joined: TokenString,

    /// Length of the left token's bytes within `joined`
    left_len: usize,

    pair: Pair,
}

impl Ord for Candidate {
    /// Highest count first.  Equal counts are broken by the lexicographically greatest joined
    /// bytes; if two pairs join to the same bytes, the one with the longer (and therefore greater)
    /// left token wins; if even that is equal, the pair with the lower ids wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| self.joined.cmp(&other.joined))
            .then_with(|| self.left_len.cmp(&other.left_len))
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Learns merges over a fixed table of pretokens until the vocabulary is full or nothing is left
/// to merge.
#[derive(Debug)]
pub struct MergeLearner {
    pairs: PairIndex,
    heap: BinaryHeap<Candidate>,
    vocab: VocabularyBuilder,
    merges: Vec<MergeRule>,
    vocab_size: usize,
}

impl MergeLearner {
    /// Start learning from `pretokens`.  `vocab` holds the byte and special tokens; learned
    /// tokens are appended to it until it reaches `vocab_size` entries.
    pub fn new(pretokens: &PretokenCounts, vocab: VocabularyBuilder, vocab_size: usize) -> Self {
        let pairs = PairIndex::new(pretokens);

        let mut learner = Self {
            heap: BinaryHeap::with_capacity(pairs.len()),
            pairs,
            vocab,
            merges: Vec::new(),
            vocab_size,
        };

        let initial = learner.pairs.pairs().map(|(pair, _)| pair).collect::<Vec<_>>();
        for pair in initial {
            learner.push_candidate(pair);
        }

        debug!(
            pretokens = pretokens.len(),
            pairs = learner.pairs.len(),
            vocab_size,
            "Initialized pair index"
        );

        learner
    }

    /// Perform one merge, returning the rule that was learned, or `None` if the vocabulary is
    /// full or no pairs are left.
    pub fn step(&mut self) -> Option<MergeRule> {
        if self.vocab.len() >= self.vocab_size {
            return None;
        }

        let best = self.pop_best()?;
        let (left, right) = best.pair;

        let token = self.vocab.push_merge(left, right);
        let rule = MergeRule { left, right, token };
        self.merges.push(rule);

        let changed = self.pairs.merge(&rule);
        for pair in changed {
            self.push_candidate(pair);
        }

        debug!(
            left,
            right,
            token,
            count = best.count,
            bytes = ?String::from_utf8_lossy(&best.joined),
            "Learned merge"
        );

        Some(rule)
    }

    /// Keep merging until the vocabulary is full or nothing is left to merge.
    pub fn learn(&mut self) {
        while self.step().is_some() {}

        info!(
            merges = self.merges.len(),
            vocab_len = self.vocab.len(),
            vocab_size = self.vocab_size,
            "Finished learning merges"
        );
    }

    /// Merges learned so far, in order.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Number of tokens in the vocabulary so far.
    pub fn vocab_len(&self) -> usize {
        self.vocab.len()
    }

    /// The pair frequencies and the current symbols of every pretoken.
    pub fn pair_index(&self) -> &PairIndex {
        &self.pairs
    }

    pub fn finish(self) -> (Vocabulary, Vec<MergeRule>) {
        (self.vocab.build(), self.merges)
    }

    fn push_candidate(&mut self, pair: Pair) {
        let count = self.pairs.count(pair);
        if count == 0 {
            return;
        }

        let (left, right) = pair;
        let left_bytes = self
            .vocab
            .bytes_for_token(left)
            .expect("BUG: pair refers to a token that isn't in the vocabulary");
        let right_bytes = self
            .vocab
            .bytes_for_token(right)
            .expect("BUG: pair refers to a token that isn't in the vocabulary");

        let mut joined = Vec::with_capacity(left_bytes.len() + right_bytes.len());
        joined.extend_from_slice(left_bytes);
        joined.extend_from_slice(right_bytes);

        self.heap.push(Candidate {
            count,
            joined,
            left_len: left_bytes.len(),
            pair,
        });
    }

    /// Pop the best pair whose heap entry is still current.
    fn pop_best(&mut self) -> Option<Candidate> {
        while let Some(candidate) = self.heap.pop() {
            if self.pairs.count(candidate.pair) == candidate.count {
                return Some(candidate);
            }
            // Stale; a fresher entry for this pair was pushed when its count changed
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenInt, BYTE_TOKEN_COUNT};

    fn learner(words: &[(&str, u64)], vocab_size: usize) -> MergeLearner {
        let mut counts = PretokenCounts::new();
        for (word, count) in words {
            counts.add_count(word.as_bytes(), *count);
        }
        MergeLearner::new(&counts, VocabularyBuilder::new::<&str>(&[]), vocab_size)
    }

    fn merged_bytes(learner: &MergeLearner) -> Vec<String> {
        learner
            .merges()
            .iter()
            .map(|rule| {
                let bytes = learner.vocab.bytes_for_token(rule.token).unwrap();
                String::from_utf8_lossy(bytes).into_owned()
            })
            .collect()
    }

    #[test]
    fn highest_count_wins() {
        let mut learner = learner(&[("ab", 3), ("cd", 5)], 1000);
        let rule = learner.step().unwrap();
        assert_eq!((b'c' as TokenInt, b'd' as TokenInt), (rule.left, rule.right));
        assert_eq!(BYTE_TOKEN_COUNT, rule.token);
    }

    #[test]
    fn ties_prefer_greatest_joined_bytes() {
        let mut learner = learner(&[("ab", 2), ("ba", 2), ("zz", 1)], 1000);
        learner.learn();
        assert_eq!(vec!["ba", "ab", "zz"], merged_bytes(&learner));
    }

    #[test]
    fn ties_compare_joined_bytes_not_left_token() {
        // After merging (b, b), the pairs (b, z) and (bb, a) are tied.  Ordering by left token
        // would pick "bb" > "b", but the joined bytes order "bz" > "bba"
        let mut learner = learner(&[("bb", 10), ("bz", 3), ("bba", 3)], 1000);
        let first = learner.step().unwrap();
        assert_eq!((b'b' as TokenInt, b'b' as TokenInt), (first.left, first.right));

        // Now "bz" is (b, z) with count 3 and "bba" is (bb, a) with count 3
        let second = learner.step().unwrap();
        assert_eq!((b'b' as TokenInt, b'z' as TokenInt), (second.left, second.right));
    }

    #[test]
    fn pairs_that_leave_one_pretoken_stay_candidates() {
        // Merging (a, b) removes (c, a) from "cab" while "ca" still holds one occurrence
        let mut learner = learner(&[("cab", 5), ("ab", 5), ("ca", 1)], 10_000);
        learner.learn();
        assert_eq!(vec!["ab", "cab", "ca"], merged_bytes(&learner));
        assert!(learner.pair_index().is_empty());
        learner.pair_index().assert_consistent();
    }

    #[test]
    fn reduced_count_still_competes() {
        // After (a, b) and (c, ab), (c, a) is left with 4 and must beat (x, y) with 3
        let mut learner = learner(&[("cab", 5), ("ab", 10), ("ca", 4), ("xy", 3)], 10_000);
        learner.learn();
        assert_eq!(vec!["ab", "cab", "ca", "xy"], merged_bytes(&learner));
    }

    #[test]
    fn stops_at_vocab_size() {
        let mut learner = learner(&[("abcdefgh", 1)], BYTE_TOKEN_COUNT + 3);
        learner.learn();
        assert_eq!(3, learner.merges().len());
        assert_eq!(BYTE_TOKEN_COUNT + 3, learner.vocab_len());
        assert!(!learner.pair_index().is_empty());
    }

    #[test]
    fn stops_when_no_pairs_remain() {
        let mut learner = learner(&[("abc", 1)], 10_000);
        learner.learn();
        assert_eq!(2, learner.merges().len());
        assert!(learner.pair_index().is_empty());
        assert!(learner.step().is_none());
    }

    #[test]
    fn zero_merges_when_vocab_is_already_full() {
        let mut learner = learner(&[("abc", 1)], BYTE_TOKEN_COUNT);
        assert!(learner.step().is_none());

        let (vocab, merges) = learner.finish();
        assert_eq!(BYTE_TOKEN_COUNT, vocab.len());
        assert!(merges.is_empty());
    }

    #[test]
    fn vocabulary_grows_by_one_per_step() {
        let mut learner = learner(
            &[("hello", 4), (" world", 3), (" help", 2), ("held", 1)],
            BYTE_TOKEN_COUNT + 8,
        );
        let mut expected_len = BYTE_TOKEN_COUNT;
        while let Some(rule) = learner.step() {
            expected_len += 1;
            assert_eq!(expected_len, learner.vocab_len());
            assert_eq!(expected_len - 1, rule.token);
            learner.pair_index().assert_consistent();
        }
        assert!(learner.vocab_len() <= BYTE_TOKEN_COUNT + 8);
    }
}

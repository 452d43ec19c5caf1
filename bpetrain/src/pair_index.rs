//! Incrementally maintained pair frequencies.
//!
//! Recounting every pair in the corpus after each merge costs time proportional to the corpus,
//! times the number of merges.  Instead, [`PairIndex`] keeps two tables in step:
//!
//! - the frequency of every adjacent symbol pair, weighted by how often each pretoken occurs
//! - a reverse index from each pair to the pretokens that currently contain it
//!
//! A merge only rewrites the pretokens listed in the reverse index for the merged pair, and only
//! adjusts the pairs those rewrites add or remove.  All adjustments go through
//! [`PairIndex::record`], which updates both tables together.
use crate::counts::PretokenCounts;
use crate::hash::{HashMap, HashSet};
use crate::token::{Pair, TokenInt, TokenString};
use crate::vocab::MergeRule;

/// One distinct pretoken and its current state.
#[derive(Clone, Debug)]
struct Word {
    /// The pretoken's original bytes, which identify it
    key: TokenString,

    /// Current symbols.  Starts as the bytes; shrinks as merges apply
    symbols: Vec<TokenInt>,

    /// Number of times the pretoken occurs in the corpus.  Never changes
    weight: u64,
}

#[derive(Clone, Debug, Default)]
pub struct PairIndex {
    /// Words are sorted by key, so a word's index is stable and independent of hash order
    words: Vec<Word>,

    /// Weighted frequency of every pair currently present.  Pairs with a count of zero are removed
    counts: HashMap<Pair, u64>,

    /// Indices into `words` of the words that currently contain each pair
    index: HashMap<Pair, HashSet<usize>>,
}

impl PairIndex {
    /// Index every pretoken, with its symbols starting out as its bytes.
    pub fn new(pretokens: &PretokenCounts) -> Self {
        let mut words = pretokens
            .iter()
            .map(|(key, weight)| Word {
                key: key.clone(),
                symbols: key.iter().map(|byte| *byte as TokenInt).collect(),
                weight,
            })
            .collect::<Vec<_>>();
        words.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let mut pair_index = Self {
            words,
            ..Default::default()
        };

        for word in 0..pair_index.words.len() {
            let occurrences = pair_occurrences(&pair_index.words[word].symbols);
            for (pair, after) in occurrences {
                pair_index.record(word, pair, 0, after);
            }
        }

        pair_index
    }

    /// Weighted frequency of `pair`, or 0 if it doesn't occur.
    pub fn count(&self, pair: Pair) -> u64 {
        self.counts.get(&pair).copied().unwrap_or(0)
    }

    /// `true` when no pretoken has two or more symbols left, so nothing can be merged.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct pairs present.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// All pairs and their weighted frequencies, in no particular order.
    pub fn pairs(&self) -> impl Iterator<Item = (Pair, u64)> + '_ {
        self.counts.iter().map(|(pair, count)| (*pair, *count))
    }

    /// Number of pretokens that currently contain `pair`.
    pub fn pretokens_containing(&self, pair: Pair) -> usize {
        self.index.get(&pair).map_or(0, HashSet::len)
    }

    /// Every pretoken's key, current symbols and weight, sorted by key.
    pub fn pretokens(&self) -> impl Iterator<Item = (&[u8], &[TokenInt], u64)> {
        self.words
            .iter()
            .map(|word| (word.key.as_slice(), word.symbols.as_slice(), word.weight))
    }

    /// Apply `rule` to every pretoken containing its pair, and update the tables to match.
    ///
    /// Returns each pair whose count changed, once, in ascending order, so the caller can
    /// refresh whatever priority structure it keeps.  A pair that left one rewritten pretoken can
    /// still occur in others, so pairs whose count fell are included even if it is now zero.  The
    /// merged pair itself is gone from the tables afterwards and is not included.
    pub fn merge(&mut self, rule: &MergeRule) -> Vec<Pair> {
        let pair = (rule.left, rule.right);

        let Some(affected) = self.index.get(&pair) else {
            return Vec::new();
        };
        let mut affected = affected.iter().copied().collect::<Vec<_>>();
        affected.sort_unstable();

        let mut changed = Vec::new();

        for word in affected {
            let before = pair_occurrences(&self.words[word].symbols);
            let symbols = rule.apply(&self.words[word].symbols);
            let after = pair_occurrences(&symbols);
            self.words[word].symbols = symbols;

            for (&p, &b) in &before {
                let a = after.get(&p).copied().unwrap_or(0);
                if a != b {
                    self.record(word, p, b, a);
                    if p != pair {
                        changed.push(p);
                    }
                }
            }
            for (&p, &a) in &after {
                if !before.contains_key(&p) {
                    self.record(word, p, 0, a);
                    changed.push(p);
                }
            }
        }

        // Non-overlapping left-to-right replacement leaves no occurrence of the pair behind
        debug_assert_eq!(self.count(pair), 0);
        self.counts.remove(&pair);
        self.index.remove(&pair);

        changed.sort_unstable();
        changed.dedup();
        changed
    }

    /// The single update routine for both tables: `word` used to contain `before` occurrences of
    /// `pair` and now contains `after`.
    fn record(&mut self, word: usize, pair: Pair, before: usize, after: usize) {
        let weight = self.words[word].weight;

        let count = self.counts.entry(pair).or_insert(0);
        *count = *count + after as u64 * weight - before as u64 * weight;
        if *count == 0 {
            self.counts.remove(&pair);
        }

        if after == 0 {
            if let Some(words) = self.index.get_mut(&pair) {
                words.remove(&word);
                if words.is_empty() {
                    self.index.remove(&pair);
                }
            }
        } else if before == 0 {
            self.index.entry(pair).or_default().insert(word);
        }
    }

    /// Recompute both tables from scratch from the current symbols, and compare with the
    /// incrementally maintained ones.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut counts: HashMap<Pair, u64> = HashMap::default();
        let mut index: HashMap<Pair, HashSet<usize>> = HashMap::default();
        for (i, word) in self.words.iter().enumerate() {
            for (pair, n) in pair_occurrences(&word.symbols) {
                *counts.entry(pair).or_insert(0) += n as u64 * word.weight;
                index.entry(pair).or_default().insert(i);
            }
        }
        assert_eq!(counts, self.counts, "pair counts diverged");
        assert_eq!(index, self.index, "reverse index diverged");
    }
}

/// Number of times each adjacent pair occurs in `symbols`.
fn pair_occurrences(symbols: &[TokenInt]) -> HashMap<Pair, usize> {
    let mut occurrences = HashMap::default();
    for window in symbols.windows(2) {
        *occurrences.entry((window[0], window[1])).or_insert(0) += 1;
    }
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: u8, b: u8) -> Pair {
        (a as TokenInt, b as TokenInt)
    }

    fn index(words: &[(&str, u64)]) -> PairIndex {
        let mut counts = PretokenCounts::new();
        for (word, count) in words {
            counts.add_count(word.as_bytes(), *count);
        }
        PairIndex::new(&counts)
    }

    #[test]
    fn initial_counts_are_weighted() {
        let index = index(&[("low", 5), ("lower", 2), ("aaa", 3)]);
        index.assert_consistent();

        assert_eq!(7, index.count(pair(b'l', b'o')));
        assert_eq!(7, index.count(pair(b'o', b'w')));
        assert_eq!(2, index.count(pair(b'w', b'e')));
        // Overlapping occurrences are both counted until a merge happens
        assert_eq!(6, index.count(pair(b'a', b'a')));
        assert_eq!(0, index.count(pair(b'x', b'y')));
        assert_eq!(2, index.pretokens_containing(pair(b'l', b'o')));
    }

    #[test]
    fn single_byte_pretokens_have_no_pairs() {
        let index = index(&[("a", 10), (" ", 4)]);
        assert!(index.is_empty());
    }

    #[test]
    fn merge_updates_neighbours() {
        let mut index = index(&[("low", 5), ("lower", 2), ("slow", 1)]);

        let rule = MergeRule {
            left: b'l' as TokenInt,
            right: b'o' as TokenInt,
            token: 256,
        };
        let changed = index.merge(&rule);
        index.assert_consistent();

        assert_eq!(0, index.count(pair(b'l', b'o')));
        assert_eq!(0, index.count(pair(b'o', b'w')));
        assert_eq!(0, index.count(pair(b's', b'l')));
        assert_eq!(8, index.count((256, b'w' as TokenInt)));
        assert_eq!(1, index.count((b's' as TokenInt, 256)));
        // Pairs away from the merge site are untouched
        assert_eq!(2, index.count(pair(b'w', b'e')));

        // (o, w) and (s, l) are gone entirely, but are still reported as changed
        assert_eq!(
            vec![
                pair(b'o', b'w'),
                pair(b's', b'l'),
                (b's' as TokenInt, 256),
                (256, b'w' as TokenInt)
            ],
            changed
        );

        let slow = index
            .pretokens()
            .find(|(key, _, _)| *key == b"slow")
            .map(|(_, symbols, _)| symbols.to_vec())
            .unwrap();
        assert_eq!(vec![b's' as TokenInt, 256, b'w' as TokenInt], slow);
    }

    #[test]
    fn merge_reports_pairs_that_survive_elsewhere() {
        let mut index = index(&[("cab", 5), ("ab", 5), ("ca", 1)]);
        assert_eq!(6, index.count(pair(b'c', b'a')));

        let rule = MergeRule {
            left: b'a' as TokenInt,
            right: b'b' as TokenInt,
            token: 256,
        };
        let changed = index.merge(&rule);
        index.assert_consistent();

        // "cab" no longer contains (c, a), but "ca" still does
        assert_eq!(1, index.count(pair(b'c', b'a')));
        assert!(changed.contains(&pair(b'c', b'a')));
        assert!(changed.contains(&(b'c' as TokenInt, 256)));
        assert!(!changed.contains(&pair(b'a', b'b')));
    }

    #[test]
    fn merge_runs_of_identical_symbols() {
        let mut index = index(&[("aaa", 1), ("aaaa", 1)]);
        assert_eq!(5, index.count(pair(b'a', b'a')));

        let rule = MergeRule {
            left: b'a' as TokenInt,
            right: b'a' as TokenInt,
            token: 256,
        };
        index.merge(&rule);
        index.assert_consistent();

        // aaa -> [aa, a], aaaa -> [aa, aa]
        assert_eq!(1, index.count((256, b'a' as TokenInt)));
        assert_eq!(1, index.count((256, 256)));
        assert_eq!(0, index.count(pair(b'a', b'a')));
    }

    #[test]
    fn merge_of_absent_pair_is_noop() {
        let mut index = index(&[("ab", 1)]);
        let rule = MergeRule {
            left: b'x' as TokenInt,
            right: b'y' as TokenInt,
            token: 256,
        };
        assert!(index.merge(&rule).is_empty());
        assert_eq!(1, index.count(pair(b'a', b'b')));
    }
}

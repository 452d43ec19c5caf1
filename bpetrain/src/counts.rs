//! Pretoken frequency tables, and the aggregation of per-worker tables into the global one.
use crate::hash::HashMap;
use crate::token::TokenString;

/// How many times each distinct pretoken occurs, keyed by the pretoken's UTF-8 bytes.
///
/// Every pretokenizer worker builds its own table; [`PretokenCounts::aggregate`] folds them
/// together once all workers have finished.  Summing is associative and commutative, so the order
/// in which tables are merged never changes the result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PretokenCounts(HashMap<TokenString, u64>);

impl PretokenCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `pretoken`.
    pub fn add(&mut self, pretoken: &[u8]) {
        self.add_count(pretoken, 1);
    }

    pub fn add_count(&mut self, pretoken: &[u8], count: u64) {
        // Avoid allocating a key for pretokens that are already in the table, which is the vast
        // majority of them
        if let Some(existing) = self.0.get_mut(pretoken) {
            *existing += count;
        } else {
            self.0.insert(pretoken.to_vec(), count);
        }
    }

    /// Add all of the counts in `other` to this table.
    pub fn merge(&mut self, mut other: PretokenCounts) {
        // Fold the smaller table into the larger one
        if other.0.len() > self.0.len() {
            std::mem::swap(self, &mut other);
        }

        for (pretoken, count) in other.0 {
            *self.0.entry(pretoken).or_insert(0) += count;
        }
    }

    /// Combine any number of tables into one.
    pub fn aggregate(tables: impl IntoIterator<Item = PretokenCounts>) -> Self {
        tables
            .into_iter()
            .fold(PretokenCounts::new(), |mut acc, table| {
                acc.merge(table);
                acc
            })
    }

    pub fn get(&self, pretoken: impl AsRef<[u8]>) -> Option<u64> {
        self.0.get(pretoken.as_ref()).copied()
    }

    /// Number of distinct pretokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of pretoken occurrences.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// All pretokens and their counts, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&TokenString, u64)> {
        self.0.iter().map(|(pretoken, count)| (pretoken, *count))
    }
}

impl<B: AsRef<[u8]>> FromIterator<B> for PretokenCounts {
    /// Count each item as one occurrence of a pretoken.
    fn from_iter<T: IntoIterator<Item = B>>(iter: T) -> Self {
        let mut counts = PretokenCounts::new();
        for pretoken in iter {
            counts.add(pretoken.as_ref());
        }
        counts
    }
}

//! Training configuration, and the validation that runs before any corpus file is touched.
use crate::error::*;
use crate::token::BYTE_TOKEN_COUNT;
use crate::Result;
use snafu::ensure;
use std::collections::HashSet;
use strum::{EnumIter, EnumString, EnumVariantNames};

/// What to do with byte sequences in the corpus that are not valid UTF-8.
///
/// Neither policy ever fails; malformed input is logged and training continues.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    EnumString,
    EnumIter,
    EnumVariantNames,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DecodePolicy {
    /// Drop invalid byte sequences.  The valid text on either side of them is joined together.
    #[default]
    Ignore,

    /// Replace each invalid byte sequence with U+FFFD.
    Replace,
}

/// Everything that controls a training run.
#[derive(Clone, Debug)]
pub struct TrainerConfig {
    /// Upper bound on the size of the resulting vocabulary, including the 256 byte tokens and the
    /// special tokens.
    pub vocab_size: usize,

    /// Literal strings that are never split or merged.  They get ids right after the byte tokens,
    /// in this order.
    pub special_tokens: Vec<String>,

    /// Number of pretokenizer workers.  `None` means one per available core.
    pub parallelism: Option<usize>,

    pub decode_policy: DecodePolicy,

    /// Byte sequence that chunk boundaries are snapped to when splitting a file between workers.
    ///
    /// Defaults to the first special token.  With neither a marker nor special tokens, every file
    /// is processed as a single chunk, since there is no sequence that is known to be safe to split
    /// on.
    pub boundary_marker: Option<Vec<u8>>,
}

impl TrainerConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            special_tokens: Vec::new(),
            parallelism: None,
            decode_policy: DecodePolicy::default(),
            boundary_marker: None,
        }
    }

    pub fn with_special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.special_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_decode_policy(mut self, decode_policy: DecodePolicy) -> Self {
        self.decode_policy = decode_policy;
        self
    }

    pub fn with_boundary_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// The smallest `vocab_size` this configuration accepts: the byte tokens plus the special
    /// tokens, with room for zero merges.
    pub fn min_vocab_size(&self) -> usize {
        BYTE_TOKEN_COUNT + self.special_tokens.len()
    }

    /// Reject configurations that can't produce a valid vocabulary.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.parallelism != Some(0), InvalidParallelismSnafu);

        let mut seen = HashSet::with_capacity(self.special_tokens.len());
        for token in &self.special_tokens {
            ensure!(!token.is_empty(), EmptySpecialTokenSnafu);
            ensure!(
                seen.insert(token.as_str()),
                DuplicateSpecialTokenSnafu {
                    token: token.clone()
                }
            );
        }

        ensure!(
            self.vocab_size >= self.min_vocab_size(),
            VocabSizeTooSmallSnafu {
                vocab_size: self.vocab_size,
                minimum: self.min_vocab_size(),
            }
        );

        if let Some(marker) = &self.boundary_marker {
            ensure!(
                !marker.is_empty(),
                InvalidArgumentSnafu {
                    reason: "the boundary marker must not be empty"
                }
            );
        }

        Ok(())
    }

    /// Number of pretokenizer workers to run.
    pub fn worker_count(&self) -> usize {
        self.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// The marker used to find chunk boundaries, if files should be split at all.
    pub(crate) fn chunk_marker(&self) -> Option<&[u8]> {
        self.boundary_marker
            .as_deref()
            .or_else(|| self.special_tokens.first().map(|token| token.as_bytes()))
    }
}

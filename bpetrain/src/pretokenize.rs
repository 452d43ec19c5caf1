//! Pretokenization: breaking text into the approximate words that merges are learned within.
//!
//! Tokenizers in the GPT-2 family do this with a regex:
//!
//! ```text
//! 's|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+
//! ```
//!
//! The look-ahead in that pattern needs a backtracking engine, and the exact meaning of `\p{L}`
//! and friends varies between engines.  [`Pretokens`] implements the same ordered alternation as
//! plain Rust code over `char`, so the output is fully determined by the Unicode properties that
//! the standard library exposes:
//!
//! - letter: [`char::is_alphabetic`] (the Unicode `Alphabetic` property)
//! - digit: [`char::is_numeric`] (general categories `Nd`, `Nl` and `No`)
//! - whitespace: [`char::is_whitespace`] (the Unicode `White_Space` property)
//!
//! A character that is both alphabetic and numeric is a letter.
use crate::config::DecodePolicy;
use crate::counts::PretokenCounts;
use crate::error::*;
use crate::Result;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use snafu::ResultExt;
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use tracing::*;

/// English contractions that are split off as their own pretokens.  Case-sensitive.
const CONTRACTIONS: &[&str] = &["'s", "'t", "'re", "'ve", "'m", "'ll", "'d"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CharClass {
    Letter,
    Digit,
    Whitespace,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        if c.is_alphabetic() {
            CharClass::Letter
        } else if c.is_numeric() {
            CharClass::Digit
        } else if c.is_whitespace() {
            CharClass::Whitespace
        } else {
            CharClass::Other
        }
    }
}

/// Iterator over the pretokens of a piece of text.
///
/// Every byte of the input ends up in exactly one pretoken, so concatenating the output
/// reproduces the input.
#[derive(Clone, Debug)]
pub struct Pretokens<'a> {
    text: &'a str,

    /// Offset into `text` where the next pretoken starts
    pos: usize,
}

impl<'a> Pretokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Pretokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return None;
        }

        // Alternatives are tried in order, and the first one that matches wins
        let len = contraction_len(rest)
            .or_else(|| class_run_len(rest, CharClass::Letter))
            .or_else(|| class_run_len(rest, CharClass::Digit))
            .or_else(|| class_run_len(rest, CharClass::Other))
            .unwrap_or_else(|| whitespace_len(rest));
        debug_assert!(len > 0);

        let pretoken = &rest[..len];
        self.pos += len;
        Some(pretoken)
    }
}

fn contraction_len(rest: &str) -> Option<usize> {
    CONTRACTIONS
        .iter()
        .find(|contraction| rest.starts_with(*contraction))
        .map(|contraction| contraction.len())
}

/// An optional single space followed by one or more characters of `class`.
fn class_run_len(rest: &str, class: CharClass) -> Option<usize> {
    let body = rest.strip_prefix(' ').unwrap_or(rest);
    let space = rest.len() - body.len();

    let run = body
        .chars()
        .take_while(|c| CharClass::of(*c) == class)
        .map(char::len_utf8)
        .sum::<usize>();

    (run > 0).then_some(space + run)
}

/// A run of whitespace.
///
/// If the run is followed by something other than whitespace, its last character is left behind
/// so that it can become the leading space of the next pretoken, unless the run is only one
/// character long.
fn whitespace_len(rest: &str) -> usize {
    let run = rest
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum::<usize>();
    debug_assert!(run > 0, "only whitespace can fail every other alternative");

    if run == rest.len() {
        return run;
    }

    let last = rest[..run].chars().next_back().map_or(0, char::len_utf8);
    if run > last {
        run - last
    } else {
        run
    }
}

/// Splits text on occurrences of special tokens.
///
/// The special tokens themselves are dropped; they act only as boundaries that no pretoken may
/// cross.  When special tokens overlap, the longest one starting at the leftmost position wins.
#[derive(Clone, Debug)]
pub struct SpecialTokenSplitter {
    /// A/C automaton for finding special tokens in text.  `None` if there are no special tokens.
    finder: Option<AhoCorasick>,
}

impl SpecialTokenSplitter {
    pub fn new<S: AsRef<str>>(special_tokens: &[S]) -> Self {
        let finder = (!special_tokens.is_empty()).then(|| {
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .dfa(true)
                .build(special_tokens.iter().map(|token| token.as_ref()))
        });

        Self { finder }
    }

    /// The non-empty pieces of `text` between special tokens.
    pub fn segments<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let Some(finder) = &self.finder else {
            return if text.is_empty() { vec![] } else { vec![text] };
        };

        let mut segments = Vec::new();
        let mut last = 0;
        for m in finder.find_iter(text) {
            segments.push(&text[last..m.start()]);
            last = m.end();
        }
        segments.push(&text[last..]);

        segments.retain(|segment| !segment.is_empty());
        segments
    }
}

/// A stateless pretokenizer worker.
///
/// It can be shared between threads; each call produces an independent table of counts.
#[derive(Clone, Debug)]
pub struct Pretokenizer {
    splitter: SpecialTokenSplitter,
    decode_policy: DecodePolicy,
}

impl Pretokenizer {
    pub fn new<S: AsRef<str>>(special_tokens: &[S], decode_policy: DecodePolicy) -> Self {
        Self {
            splitter: SpecialTokenSplitter::new(special_tokens),
            decode_policy,
        }
    }

    /// Count the pretokens in `text`, adding them to `counts`.
    pub fn count_text(&self, text: &str, counts: &mut PretokenCounts) {
        for segment in self.splitter.segments(text) {
            for pretoken in Pretokens::new(segment) {
                counts.add(pretoken.as_bytes());
            }
        }
    }

    /// Decode raw corpus bytes according to the decode policy, and count their pretokens.
    pub fn count_bytes(&self, bytes: &[u8], counts: &mut PretokenCounts) {
        let text = self.decode(bytes);

        if let Cow::Owned(_) = &text {
            // Only invalid UTF-8 causes the decoded text to be copied
            warn!(
                policy = %self.decode_policy,
                bytes = bytes.len(),
                "Corpus chunk did not decode as clean UTF-8.  \
                Invalid byte sequences were handled per the decode policy"
            );
        }

        self.count_text(&text, counts);
    }

    /// Read the byte `range` of the file at `path` and count its pretokens into `counts`.
    ///
    /// The file is opened for the duration of this call only.
    pub fn count_file_range(
        &self,
        path: &Path,
        range: Range<u64>,
        counts: &mut PretokenCounts,
    ) -> Result<()> {
        let len = range.end.saturating_sub(range.start);

        let bytes = {
            let mut file = File::open(path).with_context(|_| FileIoSnafu { path })?;
            file.seek(SeekFrom::Start(range.start))
                .with_context(|_| FileIoSnafu { path })?;

            let mut bytes = Vec::with_capacity(len as usize);
            file.take(len)
                .read_to_end(&mut bytes)
                .with_context(|_| FileIoSnafu { path })?;
            bytes
        };

        trace!(path = %path.display(), start = range.start, len = bytes.len(), "Read chunk");

        self.count_bytes(&bytes, counts);
        Ok(())
    }

    fn decode<'b>(&self, bytes: &'b [u8]) -> Cow<'b, str> {
        match self.decode_policy {
            DecodePolicy::Replace => String::from_utf8_lossy(bytes),
            DecodePolicy::Ignore => match std::str::from_utf8(bytes) {
                Ok(text) => Cow::Borrowed(text),
                Err(_) => Cow::Owned(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()),
            },
        }
    }
}

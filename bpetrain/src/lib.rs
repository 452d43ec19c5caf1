//! Byte pair encoding vocabulary training.
//!
//! Given a text corpus, [`train`] learns a vocabulary of subword tokens and the ordered list of
//! merge rules that produce them, for use by a BPE encoder.  Training happens in two phases:
//!
//! 1. Pretokenization, which is embarrassingly parallel.  Each corpus file is split into chunks
//!    at occurrences of a marker, each chunk is broken into pretokens by a pool of workers, and
//!    the per-worker counts are summed into one table.
//! 2. Merge learning, which is sequential.  The most frequent adjacent pair of symbols is merged
//!    into a new token, over and over, with pair counts maintained incrementally.
//!
//! The result depends only on the corpus and the configuration, never on the number of workers,
//! scheduling, or hash iteration order.
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::*;

mod artifact;
mod boundary;
mod config;
mod counts;
mod error;
mod hash;
mod merge;
mod pair_index;
mod pool;
mod pretokenize;
mod token;
mod vocab;

pub use artifact::*;
pub use boundary::*;
pub use config::*;
pub use counts::*;
pub use error::*;
pub use merge::*;
pub use pair_index::*;
pub use pretokenize::*;
pub use token::*;
pub use vocab::*;

pub type Result<T> = std::result::Result<T, TrainError>;

/// The output of a training run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trained {
    pub vocab: Vocabulary,

    /// Merge rules in the order they were learned, which is the order an encoder must apply them
    pub merges: Vec<MergeRule>,
}

impl Trained {
    /// The merges in their byte string form, `(left, right)`, in learned order.
    pub fn merge_bytes(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.merges.iter().map(|rule| {
            (
                self.vocab
                    .bytes_for_token(rule.left)
                    .expect("BUG: merge refers to a token that isn't in the vocabulary"),
                self.vocab
                    .bytes_for_token(rule.right)
                    .expect("BUG: merge refers to a token that isn't in the vocabulary"),
            )
        })
    }
}

/// Train a vocabulary on the files in `inputs`.
///
/// The configuration is validated before any file is opened.  Any failure to read the corpus
/// aborts training.  A corpus too small to fill the vocabulary is not an error; the vocabulary is
/// simply smaller than `vocab_size`.
pub fn train<I, P>(config: &TrainerConfig, inputs: I) -> Result<Trained>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    config.validate()?;

    let span = info_span!("train", vocab_size = config.vocab_size);
    let _guard = span.enter();

    let pretokens = pretokenize_files(config, inputs)?;

    let vocab = VocabularyBuilder::new(&config.special_tokens);
    let mut learner = MergeLearner::new(&pretokens, vocab, config.vocab_size);
    learner.learn();

    let (vocab, merges) = learner.finish();
    Ok(Trained { vocab, merges })
}

/// Count the pretokens in every file in `inputs`, in parallel.
///
/// This is the first phase of [`train`], exposed for callers that want to inspect or reuse the
/// pretoken table.
pub fn pretokenize_files<I, P>(config: &TrainerConfig, inputs: I) -> Result<PretokenCounts>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    config.validate()?;

    let workers = config.worker_count();
    let paths = inputs
        .into_iter()
        .map(|path| Arc::new(path.into()))
        .collect::<Vec<Arc<PathBuf>>>();

    let idle = idle_workers(config, paths.len(), workers);
    if idle > 0 {
        info!(
            files = paths.len(),
            workers,
            idle,
            "No boundary marker or special token to split files on; each file is one chunk, so \
            some workers will have nothing to do"
        );
    }

    let mut jobs = Vec::new();
    for path in &paths {
        for range in plan_chunks(config, path, workers)? {
            jobs.push((path.clone(), range));
        }
    }

    info!(
        files = paths.len(),
        chunks = jobs.len(),
        workers,
        "Pretokenizing corpus"
    );

    let pretokenizer = Pretokenizer::new(&config.special_tokens, config.decode_policy);
    let tables = pool::fork_join(
        "pretokenizer",
        jobs,
        workers,
        |(path, range), counts: &mut PretokenCounts| {
            pretokenizer.count_file_range(&path, range, counts)
        },
    )?;

    // Join barrier passed; fold the per-worker tables on this thread
    let counts = PretokenCounts::aggregate(tables);

    info!(
        distinct = counts.len(),
        total = counts.total(),
        "Pretokenization complete"
    );

    Ok(counts)
}

/// Number of workers that can't be given a chunk because files can't be split.
fn idle_workers(config: &TrainerConfig, files: usize, workers: usize) -> usize {
    match config.chunk_marker() {
        Some(_) => 0,
        None => workers.saturating_sub(files),
    }
}

/// Decide the byte ranges that `path` is split into.
fn plan_chunks(
    config: &TrainerConfig,
    path: &Path,
    workers: usize,
) -> Result<Vec<std::ops::Range<u64>>> {
    match config.chunk_marker() {
        Some(marker) => chunk_file(path, workers, marker),
        None => {
            let len = std::fs::metadata(path)
                .with_context(|_| FileIoSnafu { path })?
                .len();
            Ok(if len == 0 { Vec::new() } else { vec![0..len] })
        }
    }
}

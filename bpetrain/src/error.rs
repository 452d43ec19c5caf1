use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TrainError {
    #[snafu(display("Invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    #[snafu(display(
        "Vocabulary size {vocab_size} is too small; it must be at least {minimum} \
        (256 byte tokens plus the special tokens)"
    ))]
    VocabSizeTooSmall { vocab_size: usize, minimum: usize },

    #[snafu(display("The special token '{token}' was specified more than once"))]
    DuplicateSpecialToken { token: String },

    #[snafu(display("Special tokens must not be empty strings"))]
    EmptySpecialToken,

    #[snafu(display("Parallelism must be at least 1"))]
    InvalidParallelism,

    #[snafu(display("File I/O error on file '{}'", path.display()))]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("A pretokenizer worker thread panicked"))]
    WorkerPanicked,

    #[snafu(display("Malformed artifact at line {line}: {reason}"))]
    MalformedArtifact { line: usize, reason: String },
}

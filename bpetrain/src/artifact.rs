//! Reading and writing trained vocabularies and merge lists as text files.
//!
//! The vocabulary uses the same layout as tiktoken's "mergeable ranks" files: one token per
//! line, `<base64 bytes> <id>`, in id order.  The merge list has one merge per line in learned
//! order, `<base64 left> <base64 right>`.  Base64 keeps arbitrary bytes (including spaces,
//! newlines and partial UTF-8 sequences) on one line.
use crate::error::*;
use crate::token::TokenString;
use crate::vocab::Vocabulary;
use crate::{Result, Trained};
use base64::{engine::general_purpose, Engine as _};
use snafu::{ensure, ResultExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write `vocab` in `<base64 bytes> <id>` form.
pub fn write_vocab<W: Write>(vocab: &Vocabulary, mut writer: W) -> io::Result<()> {
    for (id, bytes) in vocab.iter() {
        writeln!(writer, "{} {id}", general_purpose::STANDARD.encode(bytes))?;
    }
    writer.flush()
}

/// Write merges in `<base64 left> <base64 right>` form.
pub fn write_merges<'a, W: Write>(
    merges: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
    mut writer: W,
) -> io::Result<()> {
    for (left, right) in merges {
        writeln!(
            writer,
            "{} {}",
            general_purpose::STANDARD.encode(left),
            general_purpose::STANDARD.encode(right)
        )?;
    }
    writer.flush()
}

/// Parse a vocabulary written by [`write_vocab`].
///
/// Ids must start at 0 and increase by one per line.
pub fn parse_vocab(text: &str) -> Result<Vocabulary> {
    let mut tokens = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let (bytes, id) = split_line(line, line_no)?;

        let id = id.parse::<usize>().map_err(|e| {
            MalformedArtifactSnafu {
                line: line_no,
                reason: format!("token id `{id}` is not an integer: {e}"),
            }
            .build()
        })?;
        ensure!(
            id == tokens.len(),
            MalformedArtifactSnafu {
                line: line_no,
                reason: format!("expected token id {} but found {id}", tokens.len()),
            }
        );

        tokens.push(decode_base64(bytes, line_no)?);
    }

    Ok(Vocabulary::from_tokens(tokens))
}

/// Parse a merge list written by [`write_merges`].
pub fn parse_merges(text: &str) -> Result<Vec<(TokenString, TokenString)>> {
    text.lines()
        .enumerate()
        .map(|(index, line)| {
            let line_no = index + 1;
            let (left, right) = split_line(line, line_no)?;
            Ok((decode_base64(left, line_no)?, decode_base64(right, line_no)?))
        })
        .collect()
}

/// Write the vocabulary and merges of a training run to two files.
pub fn save(trained: &Trained, vocab_path: &Path, merges_path: &Path) -> Result<()> {
    let vocab_file = File::create(vocab_path).with_context(|_| FileIoSnafu { path: vocab_path })?;
    write_vocab(&trained.vocab, BufWriter::new(vocab_file))
        .with_context(|_| FileIoSnafu { path: vocab_path })?;

    let merges_file =
        File::create(merges_path).with_context(|_| FileIoSnafu { path: merges_path })?;
    write_merges(trained.merge_bytes(), BufWriter::new(merges_file))
        .with_context(|_| FileIoSnafu { path: merges_path })?;

    Ok(())
}

/// Read a vocabulary file written by [`save`].
pub fn load_vocab(path: &Path) -> Result<Vocabulary> {
    let text = std::fs::read_to_string(path).with_context(|_| FileIoSnafu { path })?;
    parse_vocab(&text)
}

/// Read a merges file written by [`save`].
pub fn load_merges(path: &Path) -> Result<Vec<(TokenString, TokenString)>> {
    let text = std::fs::read_to_string(path).with_context(|_| FileIoSnafu { path })?;
    parse_merges(&text)
}

fn split_line(line: &str, line_no: usize) -> Result<(&str, &str)> {
    line.split_once(' ').ok_or_else(|| {
        MalformedArtifactSnafu {
            line: line_no,
            reason: "expected two space-separated fields",
        }
        .build()
    })
}

fn decode_base64(field: &str, line_no: usize) -> Result<TokenString> {
    general_purpose::STANDARD.decode(field).map_err(|e| {
        MalformedArtifactSnafu {
            line: line_no,
            reason: format!("invalid base64 value `{field}`: {e}"),
        }
        .build()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{MergeRule, VocabularyBuilder};
    use crate::TrainError;
    use assert_matches::assert_matches;

    fn trained() -> Trained {
        let mut builder = VocabularyBuilder::new(&["<|endoftext|>"]);
        let left = b' ' as usize;
        let right = 0xE2;
        let token = builder.push_merge(left, right);
        Trained {
            vocab: builder.build(),
            merges: vec![MergeRule { left, right, token }],
        }
    }

    #[test]
    fn vocab_layout() {
        let mut out = Vec::new();
        write_vocab(&trained().vocab, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(258, lines.len());
        assert_eq!("AA== 0", lines[0]);
        assert_eq!("QQ== 65", lines[65]);
        assert_eq!("PHxlbmRvZnRleHR8Pg== 256", lines[256]);
        assert_eq!("IOI= 257", lines[257]);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let vocab_path = dir.path().join("vocab.txt");
        let merges_path = dir.path().join("merges.txt");
        let trained = trained();

        save(&trained, &vocab_path, &merges_path).unwrap();

        assert_eq!(trained.vocab, load_vocab(&vocab_path).unwrap());
        assert_eq!(
            vec![(b" ".to_vec(), vec![0xE2])],
            load_merges(&merges_path).unwrap()
        );
    }

    #[test]
    fn malformed_lines_are_reported() {
        assert_matches!(
            parse_vocab("AA== 0\nAQ== 2\n"),
            Err(TrainError::MalformedArtifact { line: 2, .. })
        );
        assert_matches!(
            parse_vocab("AA== zero\n"),
            Err(TrainError::MalformedArtifact { line: 1, .. })
        );
        assert_matches!(
            parse_merges("AA== AQ==\nnot-a-merge\n"),
            Err(TrainError::MalformedArtifact { line: 2, .. })
        );
        assert_matches!(
            parse_merges("AA== !!!\n"),
            Err(TrainError::MalformedArtifact { line: 1, .. })
        );
        assert!(parse_merges("").unwrap().is_empty());
    }
}

//! Splitting a corpus file into byte ranges that can be pretokenized independently.
//!
//! Each interior boundary is snapped forward to the start of an occurrence of a marker (normally
//! a special token such as `<|endoftext|>`), so no chunk ever ends in the middle of a marker and
//! no pretoken can straddle two chunks.
use crate::error::*;
use crate::Result;
use memchr::memmem;
use snafu::{ensure, ResultExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use tracing::*;

/// Number of bytes read at a time while looking for the next marker.
const SCAN_WINDOW: usize = 4096;

/// Find the byte offsets that split `reader` into at most `desired_chunks` chunks.
///
/// The result starts at 0, ends at the size of the input and is strictly increasing.  Sparse
/// markers or small inputs produce fewer than `desired_chunks` chunks; an empty input produces
/// just `[0]`.
///
/// Fails with [`io::ErrorKind::InvalidInput`] if `desired_chunks` is 0 or `marker` is empty.
pub fn find_chunk_boundaries<R: Read + Seek>(
    reader: &mut R,
    desired_chunks: usize,
    marker: &[u8],
) -> io::Result<Vec<u64>> {
    if desired_chunks == 0 || marker.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunk count must be positive and the marker must not be empty",
        ));
    }

    let size = reader.seek(SeekFrom::End(0))?;

    let mut boundaries = (0..=desired_chunks as u64)
        .map(|i| ((i as u128 * size as u128) / desired_chunks as u128) as u64)
        .collect::<Vec<_>>();

    // A marker that starts near the end of one window continues into the next, so each window
    // carries over the last `marker.len() - 1` bytes of the previous one
    let finder = memmem::Finder::new(marker);
    let mut window = vec![0u8; SCAN_WINDOW + marker.len() - 1];

    for boundary in &mut boundaries[1..desired_chunks] {
        *boundary = snap_to_marker(reader, *boundary, size, &finder, &mut window)?;
    }

    boundaries.sort_unstable();
    boundaries.dedup();

    Ok(boundaries)
}

/// Starting at `start`, find the offset of the next occurrence of the marker, or `size` if there
/// are no more.
fn snap_to_marker<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    size: u64,
    finder: &memmem::Finder<'_>,
    window: &mut [u8],
) -> io::Result<u64> {
    reader.seek(SeekFrom::Start(start))?;

    let keep = finder.needle().len() - 1;

    // File offset of `window[0]`, and how many bytes at the front of `window` were carried over
    let mut window_start = start;
    let mut carried = 0usize;

    loop {
        let read = match reader.read(&mut window[carried..]) {
            Ok(0) => return Ok(size),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let filled = carried + read;

        if let Some(i) = finder.find(&window[..filled]) {
            return Ok(window_start + i as u64);
        }

        let keep = keep.min(filled);
        window.copy_within(filled - keep..filled, 0);
        window_start += (filled - keep) as u64;
        carried = keep;
    }
}

/// Open `path` and split it into byte ranges for `desired_chunks` workers.
///
/// The file handle is closed before this returns; each worker opens its own.
pub fn chunk_file(path: &Path, desired_chunks: usize, marker: &[u8]) -> Result<Vec<Range<u64>>> {
    ensure!(
        desired_chunks > 0,
        InvalidArgumentSnafu {
            reason: "the number of chunks must be positive"
        }
    );
    ensure!(
        !marker.is_empty(),
        InvalidArgumentSnafu {
            reason: "the boundary marker must not be empty"
        }
    );

    let mut file = File::open(path).with_context(|_| FileIoSnafu { path })?;
    let boundaries = find_chunk_boundaries(&mut file, desired_chunks, marker)
        .with_context(|_| FileIoSnafu { path })?;

    let chunks = boundaries
        .windows(2)
        .map(|pair| pair[0]..pair[1])
        .collect::<Vec<_>>();

    debug!(
        path = %path.display(),
        desired_chunks,
        chunks = chunks.len(),
        "Located chunk boundaries"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn boundaries(text: &[u8], chunks: usize, marker: &[u8]) -> Vec<u64> {
        find_chunk_boundaries(&mut Cursor::new(text), chunks, marker).unwrap()
    }

    #[test]
    fn snaps_to_marker_start() {
        // Markers start at 4 and 15
        let text = b"aaaa<|eot|>bbbb<|eot|>cccc";
        assert_eq!(vec![0, 4, 15, 26], boundaries(text, 6, b"<|eot|>"));
        assert_eq!(vec![0, 15, 26], boundaries(text, 3, b"<|eot|>"));
    }

    #[test]
    fn boundary_already_on_marker_is_kept() {
        // The naive guess for 2 chunks of 10 bytes is 5, which is where the marker starts
        let text = b"hello|world";
        assert_eq!(vec![0, 5, 11], boundaries(text, 2, b"|"));
    }

    #[test]
    fn without_markers_there_is_one_chunk() {
        let text = b"no markers anywhere in this text";
        assert_eq!(vec![0, text.len() as u64], boundaries(text, 8, b"<|eot|>"));
    }

    #[test]
    fn small_input_deduplicates() {
        assert_eq!(vec![0, 1, 3], boundaries(b"x|y", 16, b"|"));
        assert_eq!(vec![0], boundaries(b"", 4, b"|"));
    }

    #[test]
    fn finds_marker_straddling_scan_windows() {
        let marker = b"<|endoftext|>";
        let prefix = 10_000;
        let mut text = vec![b'a'; prefix];
        text.extend_from_slice(marker);
        text.extend_from_slice(&[b'b'; 1_777]);
        let size = text.len();

        // The first read covers `SCAN_WINDOW + marker.len() - 1` bytes from the guess, and the
        // marker starts 3 bytes before the end of that
        let guess = size / 2;
        assert_eq!(prefix - guess, SCAN_WINDOW + marker.len() - 1 - 3);

        assert_eq!(
            vec![0, prefix as u64, size as u64],
            boundaries(&text, 2, marker)
        );
    }

    #[test]
    fn rejects_invalid_arguments() {
        let err = find_chunk_boundaries(&mut Cursor::new(b"abc"), 0, b"|").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = find_chunk_boundaries(&mut Cursor::new(b"abc"), 2, b"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

// LogDeck - platform/fs.rs
//
// File reading helpers shared by full-mode scans and stream sessions:
// transparent decompression (gzip, bzip2, xz) and header sampling.

use crate::core::model::Compression;
use crate::core::normalize;
use crate::util::constants;
use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::path::Path;

/// Open `path` for line reading, decompressing according to `compression`.
///
/// gzip and bzip2 are decoded as a stream. xz is decoded up front into
/// memory, capped at `MAX_XZ_DECOMPRESSED_BYTES`.
pub fn open_reader(
    path: &Path,
    compression: Option<Compression>,
) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    Ok(match compression {
        None => Box::new(BufReader::new(file)),
        Some(Compression::Gzip) => Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            file,
        ))),
        Some(Compression::Bzip2) => {
            Box::new(BufReader::new(bzip2_rs::DecoderReader::new(file)))
        }
        Some(Compression::Xz) => Box::new(Cursor::new(decompress_xz(path, file)?)),
    })
}

/// Open `path`, choosing the decoder from its extension.
pub fn open_maybe_compressed(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    open_reader(path, normalize::compression_of(path))
}

fn decompress_xz(path: &Path, file: File) -> io::Result<Vec<u8>> {
    let mut reader = BufReader::new(file);
    let mut out = CappedWriter::new(constants::MAX_XZ_DECOMPRESSED_BYTES);
    match lzma_rs::xz_decompress(&mut reader, &mut out) {
        Ok(()) => Ok(out.buf),
        Err(_) if out.full => {
            tracing::warn!(
                path = %path.display(),
                limit = constants::MAX_XZ_DECOMPRESSED_BYTES,
                "xz content truncated at decompression limit"
            );
            Ok(out.buf)
        }
        Err(lzma_rs::error::Error::IoError(e)) => Err(e),
        Err(e) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("xz decompression failed: {e}"),
        )),
    }
}

/// A `Write` sink that refuses bytes beyond a fixed limit.
struct CappedWriter {
    buf: Vec<u8>,
    limit: usize,
    full: bool,
}

impl CappedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            full: false,
        }
    }
}

impl Write for CappedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = self.limit.saturating_sub(self.buf.len());
        if room == 0 {
            self.full = true;
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "decompression limit reached",
            ));
        }
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read the first `max_lines` lines of a file, decompressing if needed.
///
/// Invalid UTF-8 is replaced rather than rejected so binary-ish logs still
/// yield a sample.
pub fn read_first_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let reader = open_maybe_compressed(path)?;
    read_lines_lossy(reader, max_lines)
}

/// Read up to `max_lines` lines from `reader`, lossily decoded, with line
/// terminators stripped.
///
/// Lines longer than `MAX_SAMPLE_LINE_LENGTH` bytes are cut at that length
/// and the rest of the line is skipped without being buffered.
pub fn read_lines_lossy<R: BufRead>(mut reader: R, max_lines: usize) -> io::Result<Vec<String>> {
    let limit = constants::MAX_SAMPLE_LINE_LENGTH;
    let mut lines = Vec::with_capacity(max_lines.min(constants::MAX_SAMPLE_LINES));
    let mut buf = Vec::new();
    while lines.len() < max_lines {
        buf.clear();
        if read_line_capped(&mut reader, &mut buf, limit)? == 0 {
            break;
        }
        if buf.len() >= limit && !buf.ends_with(b"\n") {
            skip_rest_of_line(&mut reader, limit)?;
        }
        lines.push(decode_line(&buf));
    }
    Ok(lines)
}

/// `read_until(b'\n')` that stops after `limit` bytes. Returns the number of
/// bytes consumed; a longer line is left in `reader` for the next call.
pub fn read_line_capped<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> io::Result<usize> {
    reader
        .by_ref()
        .take(limit.max(1) as u64)
        .read_until(b'\n', buf)
}

/// Consume bytes up to and including the next newline, `limit` at a time.
fn skip_rest_of_line<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<()> {
    let mut scratch = Vec::with_capacity(limit.min(64 * 1024));
    loop {
        scratch.clear();
        let n = read_line_capped(reader, &mut scratch, limit)?;
        if n == 0 || scratch.ends_with(b"\n") {
            return Ok(());
        }
    }
}

/// Lossy UTF-8 decode of one raw line with `\n` / `\r\n` removed.
pub fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw
        .strip_suffix(b"\n")
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .unwrap_or(raw);
    String::from_utf8_lossy(trimmed).into_owned()
}

/// A value that changes when the file at a path is replaced by a new one.
/// `None` on platforms without stable file ids.
pub fn file_identity(meta: &Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(meta.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

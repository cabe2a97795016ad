//! Encoding and delimiter resolution for delimited-text input.
//!
//! [`EncodingResolver`] tries a fixed, ordered list of candidate encodings. For each candidate it
//! opens a fresh [`DelimitedReader`] and pulls one batch as a probe; the first candidate whose
//! probe succeeds is adopted for the whole file. If every candidate fails, a permissive dialect
//! (Latin-1, quoting disabled, backslash escapes) gets one last probe before the resolver gives
//! up with [`ImportError::EncodingExhausted`].
//!
//! Probing never touches the reader used for the real import: each probe opens the file anew,
//! and the session reads from the top once the settings are confirmed.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use encoding_rs::{Decoder, DecoderResult, UTF_16LE, UTF_8, WINDOWS_1252};
use tracing::debug;

use crate::error::{ImportError, ImportResult};
use crate::types::{CsvDialect, SAMPLE_WINDOW, SourceDescriptor, TextEncoding};

use super::csv::DelimitedReader;

/// Pick the field delimiter from a sample of raw bytes.
///
/// Counts `;` and `,`; `;` wins only when strictly more frequent. Quoted fields containing the
/// other character skew the count; that heuristic limitation is accepted.
pub fn sniff_delimiter(sample: &[u8]) -> u8 {
    let semicolons = sample.iter().filter(|&&b| b == b';').count();
    let commas = sample.iter().filter(|&&b| b == b',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Read up to [`SAMPLE_WINDOW`] bytes from the start of `path`.
pub fn read_sample(path: &Path) -> io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_WINDOW);
    File::open(path)?
        .take(SAMPLE_WINDOW as u64)
        .read_to_end(&mut sample)?;
    Ok(sample)
}

/// One candidate tried by the resolver, and why it was rejected (if it was).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingAttempt {
    pub encoding: TextEncoding,
    pub dialect: CsvDialect,
    pub error: Option<String>,
}

impl EncodingAttempt {
    fn describe(&self) -> String {
        let mode = if self.dialect.quoting { "" } else { " (permissive)" };
        match &self.error {
            Some(e) => format!("{}{mode}: {e}", self.encoding),
            None => format!("{}{mode}: ok", self.encoding),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub descriptor: SourceDescriptor,
    /// Every candidate tried, in order, ending with the adopted one.
    pub attempts: Vec<EncodingAttempt>,
    /// Whether the permissive fallback dialect was adopted.
    pub permissive: bool,
}

/// Determines text encoding and delimiter for a delimited file.
#[derive(Debug, Clone)]
pub struct EncodingResolver<'a> {
    candidates: &'a [TextEncoding],
    delimiter: Option<u8>,
    batch_size: usize,
}

impl<'a> EncodingResolver<'a> {
    /// `delimiter` skips sniffing when supplied; `batch_size` sizes the probe batch.
    pub fn new(candidates: &'a [TextEncoding], delimiter: Option<u8>, batch_size: usize) -> Self {
        Self {
            candidates,
            delimiter,
            batch_size: batch_size.max(1),
        }
    }

    pub fn resolve(&self, path: &Path) -> ImportResult<Resolution> {
        let delimiter = match self.delimiter {
            Some(d) => d,
            None => sniff_delimiter(&read_sample(path)?),
        };
        debug!(path = %path.display(), delimiter = %char::from(delimiter), "delimiter selected");

        let permissive = (TextEncoding::Latin1, CsvDialect::permissive(delimiter));
        let plan = self
            .candidates
            .iter()
            .map(|&enc| (enc, CsvDialect::standard(delimiter)))
            .chain(std::iter::once(permissive));

        let mut attempts = Vec::new();
        for (encoding, dialect) in plan {
            match probe(path, encoding, dialect, self.batch_size) {
                Ok(()) => {
                    attempts.push(EncodingAttempt {
                        encoding,
                        dialect,
                        error: None,
                    });
                    return Ok(Resolution {
                        descriptor: SourceDescriptor::delimited(path, encoding, dialect),
                        attempts,
                        permissive: !dialect.quoting,
                    });
                }
                Err(e) => {
                    debug!(encoding = %encoding, error = %e, "encoding probe failed");
                    attempts.push(EncodingAttempt {
                        encoding,
                        dialect,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Err(ImportError::EncodingExhausted {
            path: path.to_path_buf(),
            attempts: attempts.iter().map(EncodingAttempt::describe).collect(),
        })
    }
}

/// Open a throwaway reader with the given settings and pull one batch.
fn probe(path: &Path, encoding: TextEncoding, dialect: CsvDialect, batch_size: usize) -> ImportResult<()> {
    let mut reader = DelimitedReader::from_path(path, encoding, dialect, batch_size)?;
    match reader.next() {
        Some(Err(e)) => Err(e),
        _ => Ok(()),
    }
}

enum Codec {
    Latin1,
    Decoder(Decoder),
}

/// Streaming transcoder from a source encoding to UTF-8.
///
/// A byte sequence that is invalid in the source encoding surfaces as an
/// [`io::ErrorKind::InvalidData`] read error once everything decoded before it has been read.
/// Nothing is replaced, so a wrong candidate encoding is always detected. A leading byte-order
/// mark is consumed.
pub struct DecodingReader<R> {
    inner: R,
    encoding: TextEncoding,
    codec: Codec,
    raw: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    consumed: u64,
    finished: bool,
    pending: Option<io::Error>,
}

const RAW_CHUNK: usize = 8 * 1024;

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: TextEncoding) -> Self {
        let codec = match encoding {
            TextEncoding::Latin1 => Codec::Latin1,
            TextEncoding::Utf8 => Codec::Decoder(UTF_8.new_decoder()),
            TextEncoding::Utf16 => Codec::Decoder(UTF_16LE.new_decoder()),
            TextEncoding::Windows1252 => Codec::Decoder(WINDOWS_1252.new_decoder()),
        };
        Self {
            inner,
            encoding,
            codec,
            raw: vec![0; RAW_CHUNK],
            out: Vec::new(),
            out_pos: 0,
            consumed: 0,
            finished: false,
            pending: None,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.out_pos = 0;

        while self.out.is_empty() && !self.finished {
            let n = self.inner.read(&mut self.raw)?;
            let last = n == 0;
            let src = &self.raw[..n];

            match &mut self.codec {
                Codec::Latin1 => {
                    for &b in src {
                        if b < 0x80 {
                            self.out.push(b);
                        } else {
                            self.out.push(0xC0 | (b >> 6));
                            self.out.push(0x80 | (b & 0x3F));
                        }
                    }
                }
                Codec::Decoder(decoder) => {
                    let needed = decoder
                        .max_utf8_buffer_length_without_replacement(n)
                        .ok_or_else(|| io::Error::other("decode buffer size overflow"))?;
                    self.out.resize(needed, 0);
                    let (result, read, written) =
                        decoder.decode_to_utf8_without_replacement(src, &mut self.out, last);
                    self.out.truncate(written);
                    match result {
                        DecoderResult::InputEmpty => {}
                        DecoderResult::Malformed(_, _) => {
                            self.pending = Some(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!(
                                    "invalid {} byte sequence near byte {}",
                                    self.encoding,
                                    self.consumed + read as u64
                                ),
                            ));
                            self.finished = true;
                            return Ok(());
                        }
                        DecoderResult::OutputFull => {
                            return Err(io::Error::other("decode buffer undersized"));
                        }
                    }
                }
            }

            self.consumed += n as u64;
            self.finished = last;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.out_pos >= self.out.len() {
            if let Some(e) = self.pending.take() {
                return Err(e);
            }
            self.refill()?;
            if self.out_pos >= self.out.len() {
                if let Some(e) = self.pending.take() {
                    return Err(e);
                }
            }
        }
        let avail = &self.out[self.out_pos..];
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.out_pos += n;
        Ok(n)
    }
}

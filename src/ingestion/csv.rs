//! Delimited-text batch reader.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ImportError, ImportResult};
use crate::types::{CsvDialect, RowBatch, TextEncoding};

use super::encoding::DecodingReader;
use super::schema::normalize_headers;

/// Streams a delimited file as fixed-size [`RowBatch`]es.
///
/// Rules:
///
/// - The first record is the header row; headers are normalised with [`normalize_headers`].
/// - Every value is kept as text. Empty fields become `None`.
/// - A record whose field count differs from the header is skipped and recorded as
///   [`ImportError::MalformedRow`] (see [`DelimitedReader::take_malformed`]).
/// - Bytes that are invalid in the chosen encoding end the stream with [`ImportError::Decode`].
/// - With quoting disabled, the dialect's escape character (if any) makes the next character
///   literal, so an escaped delimiter stays inside its field.
///
/// The sequence is lazy and cannot be restarted; once it yields `None` or an error it stays
/// exhausted.
pub struct DelimitedReader<R: Read = File> {
    records: csv::Reader<DecodingReader<R>>,
    columns: Arc<Vec<String>>,
    encoding: TextEncoding,
    batch_size: usize,
    escape: Option<(char, char)>,
    record: csv::StringRecord,
    malformed: Vec<ImportError>,
    skipped: u64,
    finished: bool,
}

impl DelimitedReader<File> {
    /// Open `path` with strict decoding in `encoding`.
    pub fn from_path(
        path: impl AsRef<Path>,
        encoding: TextEncoding,
        dialect: CsvDialect,
        batch_size: usize,
    ) -> ImportResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, encoding, dialect, batch_size)
    }
}

impl<R: Read> DelimitedReader<R> {
    /// Wrap any byte source. Fails if the header row is empty or cannot be decoded.
    pub fn from_reader(
        source: R,
        encoding: TextEncoding,
        dialect: CsvDialect,
        batch_size: usize,
    ) -> ImportResult<Self> {
        // The tokenizer only honours escapes inside quotes. Unquoted escapes are resolved after
        // splitting, so field counts are checked here rather than by the tokenizer.
        let escape = match dialect.escape {
            Some(esc) if !dialect.quoting => Some((char::from(dialect.delimiter), char::from(esc))),
            _ => None,
        };
        let mut records = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(escape.is_some())
            .delimiter(dialect.delimiter)
            .quoting(dialect.quoting)
            .escape(dialect.escape)
            .double_quote(dialect.quoting)
            .from_reader(DecodingReader::new(source, encoding));

        let headers = records
            .headers()
            .map_err(|e| map_csv_error(encoding, e))?;
        let headers: Vec<String> = match escape {
            Some((delimiter, esc)) => split_unquoted(headers, delimiter, esc),
            None => headers.iter().map(str::to_owned).collect(),
        };
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ImportError::SchemaMismatch {
                message: "no columns to parse (empty header row)".to_string(),
            });
        }
        let columns = normalize_headers(headers.iter().map(String::as_str));

        Ok(Self {
            records,
            columns: Arc::new(columns),
            encoding,
            batch_size: batch_size.max(1),
            escape,
            record: csv::StringRecord::new(),
            malformed: Vec::new(),
            skipped: 0,
            finished: false,
        })
    }

    /// Normalised header names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Total malformed records skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Drain the malformed-row reports accumulated since the last call.
    pub fn take_malformed(&mut self) -> Vec<ImportError> {
        std::mem::take(&mut self.malformed)
    }

    fn read_batch(&mut self) -> ImportResult<Vec<Vec<Option<String>>>> {
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match self.records.read_record(&mut self.record) {
                Ok(true) => match self.escape {
                    None => rows.push(
                        self.record
                            .iter()
                            .map(|v| (!v.is_empty()).then(|| v.to_owned()))
                            .collect(),
                    ),
                    Some((delimiter, esc)) => {
                        let fields = split_unquoted(&self.record, delimiter, esc);
                        if fields.len() == self.columns.len() {
                            rows.push(
                                fields
                                    .into_iter()
                                    .map(|v| (!v.is_empty()).then_some(v))
                                    .collect(),
                            );
                        } else {
                            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                            let expected = self.columns.len();
                            let message = format!("expected {expected} fields, saw {}", fields.len());
                            self.skip(line, message);
                        }
                    }
                },
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    match e.kind() {
                        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
                            self.skip(line, format!("expected {expected_len} fields, saw {len}"));
                        }
                        _ => return Err(map_csv_error(self.encoding, e)),
                    }
                }
            }
        }
        Ok(rows)
    }

    fn skip(&mut self, line: u64, message: String) {
        warn!(line, %message, "skipping malformed row");
        self.skipped += 1;
        self.malformed.push(ImportError::MalformedRow { line, message });
    }
}

impl<R: Read> Iterator for DelimitedReader<R> {
    type Item = ImportResult<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_batch() {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(Ok(RowBatch::new(Arc::clone(&self.columns), rows))),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Rejoin the pieces of an unquoted record and split it again, treating `esc` as making the
/// next character literal. A trailing lone `esc` is kept as is.
fn split_unquoted(record: &csv::StringRecord, delimiter: char, esc: char) -> Vec<String> {
    let mut fields = Vec::with_capacity(record.len());
    let mut current = String::new();
    let mut escaped = false;
    for (i, piece) in record.iter().enumerate() {
        if i > 0 {
            if escaped {
                current.push(delimiter);
                escaped = false;
            } else {
                fields.push(std::mem::take(&mut current));
            }
        }
        for c in piece.chars() {
            if escaped {
                current.push(c);
                escaped = false;
            } else if c == esc {
                escaped = true;
            } else {
                current.push(c);
            }
        }
    }
    if escaped {
        current.push(esc);
    }
    fields.push(current);
    fields
}

fn map_csv_error(encoding: TextEncoding, err: csv::Error) -> ImportError {
    match err.kind() {
        csv::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::InvalidData => {
            ImportError::Decode {
                encoding: encoding.name(),
                message: io_err.to_string(),
            }
        }
        csv::ErrorKind::Utf8 { err: utf8, .. } => ImportError::Decode {
            encoding: encoding.name(),
            message: utf8.to_string(),
        },
        _ => ImportError::Csv(err),
    }
}

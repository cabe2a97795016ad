//! Core data model for an import session.
//!
//! Every cell is carried as text (`Option<String>`, `None` for an empty cell) against a
//! [`TableSchema`] that is frozen once the first [`RowBatch`] has been persisted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

/// Rows per batch (one write unit) unless overridden in the session options.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Bytes read from the start of a delimited file for delimiter sniffing.
pub const SAMPLE_WINDOW: usize = 4096;

/// Input format, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFormat {
    /// Delimited text (`.csv`).
    DelimitedText,
    /// Single-sheet spreadsheet (`.xlsx`).
    Spreadsheet,
}

impl SourceFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::DelimitedText),
            "xlsx" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// Text encodings tried by the encoding cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// UTF-16, little-endian unless a big-endian BOM is present.
    Utf16,
    Windows1252,
}

impl TextEncoding {
    /// Candidate order used when the caller does not supply one.
    pub const CASCADE: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Latin1,
        TextEncoding::Utf16,
        TextEncoding::Windows1252,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Utf16 => "utf-16",
            TextEncoding::Windows1252 => "windows-1252",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CSV tokenizer settings adopted for the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CsvDialect {
    pub delimiter: u8,
    pub quoting: bool,
    pub escape: Option<u8>,
}

impl CsvDialect {
    /// Standard dialect: double-quote quoting, no escape character.
    pub fn standard(delimiter: u8) -> Self {
        Self {
            delimiter,
            quoting: true,
            escape: None,
        }
    }

    /// Last-resort dialect: quoting disabled, backslash escapes.
    pub fn permissive(delimiter: u8) -> Self {
        Self {
            delimiter,
            quoting: false,
            escape: Some(b'\\'),
        }
    }
}

/// A resolved input: path, format, and (for delimited text) encoding and dialect.
///
/// Created once per session and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    path: PathBuf,
    format: SourceFormat,
    encoding: Option<TextEncoding>,
    dialect: Option<CsvDialect>,
}

impl SourceDescriptor {
    pub fn delimited(path: impl Into<PathBuf>, encoding: TextEncoding, dialect: CsvDialect) -> Self {
        Self {
            path: path.into(),
            format: SourceFormat::DelimitedText,
            encoding: Some(encoding),
            dialect: Some(dialect),
        }
    }

    pub fn spreadsheet(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: SourceFormat::Spreadsheet,
            encoding: None,
            dialect: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Resolved text encoding. `None` for spreadsheets.
    pub fn encoding(&self) -> Option<TextEncoding> {
        self.encoding
    }

    /// Resolved CSV dialect. `None` for spreadsheets.
    pub fn dialect(&self) -> Option<CsvDialect> {
        self.dialect
    }
}

/// Ordered column names of the target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the position of a column by name, if present. ASCII case is ignored, as in SQL.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// A contiguous slice of input rows written as one unit.
///
/// Rows are positional against `columns`; `None` is an empty cell (stored as NULL).
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    columns: Arc<Vec<String>>,
    rows: Vec<Vec<Option<String>>>,
}

impl RowBatch {
    pub fn new(columns: Arc<Vec<String>>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a column computed from an existing one.
    ///
    /// No-op when `source` is absent or `target` already exists. Names match ignoring ASCII
    /// case.
    pub fn with_derived_column<F>(mut self, source: &str, target: &str, mut derive: F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        let Some(src_idx) = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(source))
        else {
            return self;
        };
        if self.columns.iter().any(|c| c.eq_ignore_ascii_case(target)) {
            return self;
        }

        let mut columns = self.columns.as_ref().clone();
        columns.push(target.to_owned());
        self.columns = Arc::new(columns);

        for row in &mut self.rows {
            let derived = row.get(src_idx).and_then(|v| v.as_deref()).map(&mut derive);
            row.push(derived);
        }
        self
    }
}

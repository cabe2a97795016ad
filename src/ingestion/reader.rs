//! Format-independent batch source.
//!
//! [`TabularReader`] gives the session one iterator of [`RowBatch`]es whatever the input format.
//! Delimited text is streamed; a spreadsheet is decoded whole and then sliced. Either way the
//! session traverses it exactly once.

use std::path::Path;

use crate::error::{ImportError, ImportResult};
use crate::types::{RowBatch, SourceDescriptor, SourceFormat};

use super::csv::DelimitedReader;
#[cfg(feature = "excel")]
use super::excel::SpreadsheetReader;

pub enum TabularReader {
    Delimited(DelimitedReader),
    #[cfg(feature = "excel")]
    Spreadsheet(SpreadsheetReader),
}

impl TabularReader {
    /// Open the source with its resolved settings, from the top of the file.
    pub fn open(source: &SourceDescriptor, batch_size: usize) -> ImportResult<Self> {
        match (source.format(), source.encoding(), source.dialect()) {
            (SourceFormat::DelimitedText, Some(encoding), Some(dialect)) => Ok(Self::Delimited(
                DelimitedReader::from_path(source.path(), encoding, dialect, batch_size)?,
            )),
            (SourceFormat::DelimitedText, _, _) => Err(ImportError::SchemaMismatch {
                message: format!(
                    "delimited source {} has no resolved encoding/dialect",
                    source.path().display()
                ),
            }),
            (SourceFormat::Spreadsheet, _, _) => open_spreadsheet(source.path(), batch_size),
        }
    }

    /// Header columns as read from the input (before computed columns are added).
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Delimited(r) => r.columns(),
            #[cfg(feature = "excel")]
            Self::Spreadsheet(r) => r.columns(),
        }
    }

    /// Drain malformed-row reports. Spreadsheets never produce any.
    pub fn take_malformed(&mut self) -> Vec<ImportError> {
        match self {
            Self::Delimited(r) => r.take_malformed(),
            #[cfg(feature = "excel")]
            Self::Spreadsheet(_) => Vec::new(),
        }
    }
}

impl Iterator for TabularReader {
    type Item = ImportResult<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Delimited(r) => r.next(),
            #[cfg(feature = "excel")]
            Self::Spreadsheet(r) => r.next(),
        }
    }
}

/// Derive the input format from the file extension.
///
/// The extension is authoritative: a `.csv` containing a workbook fails later while reading.
pub fn infer_format_from_path(path: &Path) -> ImportResult<SourceFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    SourceFormat::from_extension(ext).ok_or_else(|| ImportError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: ext.to_string(),
    })
}

fn open_spreadsheet(path: &Path, batch_size: usize) -> ImportResult<TabularReader> {
    #[cfg(feature = "excel")]
    {
        let reader = SpreadsheetReader::from_path(path, batch_size)?;
        tracing::debug!(sheet = reader.sheet(), rows = reader.remaining(), "reading first sheet");
        Ok(TabularReader::Spreadsheet(reader))
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = batch_size;
        Err(ImportError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: "xlsx (excel ingestion not enabled; enable cargo feature 'excel')".to_string(),
        })
    }
}

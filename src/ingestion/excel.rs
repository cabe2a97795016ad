#![cfg(feature = "excel")]

use std::path::Path;
use std::sync::Arc;
use std::vec;

use calamine::{Data, Reader, open_workbook_auto};

use crate::error::{ImportError, ImportResult};
use crate::types::RowBatch;

use super::schema::normalize_headers;

/// Reads the first sheet of a workbook and hands it out in fixed-size [`RowBatch`]es.
///
/// Behavior:
/// - The whole sheet is decoded up front (the format requires it), then sliced into batches
/// - The first non-empty row is the header row
/// - Fully empty rows after the header are dropped
/// - Every cell is rendered as text; empty cells become `None`
pub struct SpreadsheetReader {
    sheet: String,
    columns: Arc<Vec<String>>,
    rows: vec::IntoIter<Vec<Option<String>>>,
    batch_size: usize,
}

impl SpreadsheetReader {
    pub fn from_path(path: impl AsRef<Path>, batch_size: usize) -> ImportResult<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?;
        let range = workbook.worksheet_range(&sheet)?;
        let (columns, rows) = materialize(&range).map_err(|e| wrap_schema_err_with_sheet(&sheet, e))?;

        Ok(Self {
            sheet,
            columns: Arc::new(columns),
            rows: rows.into_iter(),
            batch_size: batch_size.max(1),
        })
    }

    /// Name of the sheet being read.
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not yet handed out.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for SpreadsheetReader {
    type Item = ImportResult<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows: Vec<_> = self.rows.by_ref().take(self.batch_size).collect();
        if rows.is_empty() {
            return None;
        }
        Some(Ok(RowBatch::new(Arc::clone(&self.columns), rows)))
    }
}

fn materialize(range: &calamine::Range<Data>) -> ImportResult<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let mut rows = range.rows();
    let header = rows
        .by_ref()
        .find(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .ok_or_else(|| ImportError::SchemaMismatch {
            message: "sheet has no non-empty rows (no header row found)".to_string(),
        })?;

    let header_cells: Vec<String> = header
        .iter()
        .map(|c| cell_to_text(c).unwrap_or_default())
        .collect();
    let columns = normalize_headers(header_cells.iter().map(String::as_str));
    let width = columns.len();

    let body = rows
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| (0..width).map(|i| row.get(i).and_then(cell_to_text)).collect())
        .collect();

    Ok((columns, body))
}

fn wrap_schema_err_with_sheet(sheet: &str, err: ImportError) -> ImportError {
    match err {
        ImportError::SchemaMismatch { message } => ImportError::SchemaMismatch {
            message: format!("sheet '{sheet}': {message}"),
        },
        other => other,
    }
}

/// Render a cell as text without type coercion. Integral floats drop the `.0`.
fn cell_to_text(c: &Data) -> Option<String> {
    let text = match c {
        Data::Empty => return None,
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    };
    (!text.is_empty()).then_some(text)
}

use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Error type returned by the import pipeline.
///
/// A single enum shared by encoding resolution, CSV/spreadsheet reading, table loading and
/// index building. Some variants are recoverable (see [`ImportError::is_recoverable`]): the
/// pipeline reports them to the observer and keeps going.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Underlying I/O error (permission denied, truncated read, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file does not exist.
    #[error("input file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The input extension is neither `.csv` nor `.xlsx`.
    #[error("unsupported input format '{extension}' for {} (use .csv or .xlsx)", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Every candidate encoding (and the permissive fallback) failed to produce a batch.
    #[error("no encoding could read {}: {}", path.display(), attempts.join("; "))]
    EncodingExhausted { path: PathBuf, attempts: Vec<String> },

    #[cfg(feature = "excel")]
    /// Spreadsheet decoding error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV tokenizer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Input bytes are not valid in the resolved encoding.
    #[error("input is not valid {encoding}: {message}")]
    Decode {
        encoding: &'static str,
        message: String,
    },

    /// A line could not be parsed with the current dialect. Skipped, not fatal.
    #[error("malformed row at line {line}: {message}")]
    MalformedRow { line: u64, message: String },

    /// A batch's columns diverge from the table schema frozen by the first batch.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// The storage engine rejected a write. Fatal to the session.
    #[error("storage write failed during {stage}: {source}")]
    StorageWrite {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The lookup index on the key column (or the surrogate identifier) could not be built.
    #[error("failed to build index on column '{column}': {source}")]
    KeyIndex {
        column: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The full-text engine rejected the search index. Triggers the conventional index fallback.
    #[error("full-text search index unavailable: {source}")]
    SearchIndexUnavailable {
        #[source]
        source: rusqlite::Error,
    },

    /// Discovery found no `.csv`/`.xlsx` candidate.
    #[error("no .csv or .xlsx file found in {}", dir.display())]
    NoInputFound { dir: PathBuf },
}

impl ImportError {
    /// Whether the pipeline logs this error and continues instead of aborting the session.
    ///
    /// `SchemaMismatch` only reaches the caller as an error under the strict schema policy,
    /// so it is classified as fatal here; the warn policy reports it through the observer.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ImportError::MalformedRow { .. } | ImportError::SearchIndexUnavailable { .. }
        )
    }

    pub(crate) fn storage(stage: &'static str) -> impl FnOnce(rusqlite::Error) -> ImportError {
        move |source| ImportError::StorageWrite { stage, source }
    }
}

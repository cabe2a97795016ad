//! Import session: one input file, one output store, one pass.
//!
//! [`ImportSession::run`] walks `Initializing → Resolving → Loading → Indexing → Committed`.
//! Any error moves the session to `Failed`.
//!
//! The whole import is a single transaction. Replacing the table, writing every batch and
//! building the indexes all happen inside it, and it commits once, on entering `Committed`. On
//! failure the transaction is dropped and rolled back, so a table that existed before the
//! import is left as it was. The connection is scoped to [`ImportSession::run`] and is released
//! on every exit path. It is opened only after the input has been resolved, so an input that
//! cannot be read leaves no output file behind.
//!
//! ```no_run
//! use tabload::session::{ImportOptions, import_file};
//!
//! # fn main() -> Result<(), tabload::ImportError> {
//! let report = import_file("patrimonios.csv", "patrimonios.db", &ImportOptions::default())?;
//! println!("rows={} search={:?}", report.rows, report.search_index);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ImportError, ImportResult};
use crate::ingestion::encoding::EncodingResolver;
use crate::ingestion::observability::{
    BatchProgress, ImportContext, ImportObserver, ImportSeverity, ImportStats,
};
use crate::ingestion::reader::{TabularReader, infer_format_from_path};
use crate::ingestion::schema::{
    SchemaCheck, SchemaPolicy, SchemaTracker, mirror_column_name, with_upper_mirror,
};
use crate::store::index::DEFAULT_TOKENIZER;
use crate::store::{IndexBuilder, SearchIndexKind, TransactionalLoader, open_store};
use crate::types::{
    DEFAULT_BATCH_SIZE, SourceDescriptor, SourceFormat, TableSchema, TextEncoding,
};

/// Table name used when none is given.
pub const DEFAULT_TABLE: &str = "patrimonios";

/// Session states. `Committed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Initializing,
    Resolving,
    Loading,
    Indexing,
    Committed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Resolving => "resolving",
            SessionState::Loading => "loading",
            SessionState::Indexing => "indexing",
            SessionState::Committed => "committed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling an import session.
///
/// Use [`Default`] for the common case.
#[derive(Clone)]
pub struct ImportOptions {
    /// Target table; replaced if it already exists.
    pub table_name: String,
    /// Field delimiter. If `None`, sniffed from the first bytes of the file.
    pub delimiter: Option<u8>,
    /// Rows per batch.
    pub batch_size: usize,
    /// Column that gets a non-unique lookup index, when present.
    pub key_column: String,
    /// Identifier column; added as a surrogate when absent.
    pub id_column: String,
    /// Text column mirrored in uppercase and indexed for search.
    pub text_column: String,
    /// Suffix of the uppercase mirror column.
    pub mirror_suffix: String,
    /// Encoding cascade for delimited text, tried in order.
    pub encodings: Vec<TextEncoding>,
    /// Reaction to batches whose columns drift from the table schema.
    pub schema_policy: SchemaPolicy,
    /// FTS5 `tokenize` argument.
    pub search_tokenizer: String,
    /// Build indexes after loading.
    pub build_indexes: bool,
    /// Optional observer for progress, warnings and outcomes.
    pub observer: Option<Arc<dyn ImportObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: ImportSeverity,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("table_name", &self.table_name)
            .field("delimiter", &self.delimiter.map(char::from))
            .field("batch_size", &self.batch_size)
            .field("key_column", &self.key_column)
            .field("id_column", &self.id_column)
            .field("text_column", &self.text_column)
            .field("mirror_suffix", &self.mirror_suffix)
            .field("encodings", &self.encodings)
            .field("schema_policy", &self.schema_policy)
            .field("search_tokenizer", &self.search_tokenizer)
            .field("build_indexes", &self.build_indexes)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE.to_string(),
            delimiter: None,
            batch_size: DEFAULT_BATCH_SIZE,
            key_column: "codigo".to_string(),
            id_column: "id".to_string(),
            text_column: "descricao".to_string(),
            mirror_suffix: "_upper".to_string(),
            encodings: TextEncoding::CASCADE.to_vec(),
            schema_policy: SchemaPolicy::Warn,
            search_tokenizer: DEFAULT_TOKENIZER.to_string(),
            build_indexes: true,
            observer: None,
            alert_at_or_above: ImportSeverity::Critical,
        }
    }
}

impl ImportOptions {
    /// Name of the uppercase mirror column.
    pub fn mirror_column(&self) -> String {
        mirror_column_name(&self.text_column, &self.mirror_suffix)
    }
}

/// Summary of a committed session.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub table: String,
    pub format: SourceFormat,
    /// Resolved encoding (delimited text only).
    pub encoding: Option<TextEncoding>,
    /// Resolved delimiter (delimited text only).
    pub delimiter: Option<char>,
    /// Whether the permissive CSV dialect had to be used.
    pub permissive_dialect: bool,
    pub columns: Vec<String>,
    pub rows: u64,
    pub batches: usize,
    pub malformed_rows: u64,
    pub schema_warnings: usize,
    pub key_index: bool,
    pub surrogate_id_added: bool,
    pub search_index: SearchIndexKind,
    pub output_bytes: u64,
}

struct Resolved {
    source: SourceDescriptor,
    permissive: bool,
}

struct Loaded {
    schema: TableSchema,
    rows: u64,
    batches: usize,
    malformed: u64,
    drift: usize,
}

struct Indexed {
    key_index: bool,
    surrogate_id_added: bool,
    search: SearchIndexKind,
}

/// A single-use import of one file into one table.
pub struct ImportSession {
    input: PathBuf,
    output: PathBuf,
    options: ImportOptions,
    state: SessionState,
    format: Option<SourceFormat>,
}

impl ImportSession {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: ImportOptions) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            options,
            state: SessionState::Initializing,
            format: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run the session to a terminal state.
    ///
    /// On failure the error carries the stage it happened in via the observer/log context; the
    /// session itself ends in [`SessionState::Failed`].
    pub fn run(&mut self) -> ImportResult<ImportReport> {
        if self.state != SessionState::Initializing {
            return Err(ImportError::Io(std::io::Error::other(format!(
                "import session already ran (state: {})",
                self.state
            ))));
        }

        match self.execute() {
            Ok(report) => {
                self.transition(SessionState::Committed);
                info!(
                    table = %report.table,
                    rows = report.rows,
                    size_mb = %format!("{:.2}", report.output_bytes as f64 / (1024.0 * 1024.0)),
                    "import complete"
                );
                if let Some(obs) = self.options.observer.as_ref() {
                    obs.on_success(
                        &self.context(),
                        ImportStats {
                            rows: report.rows,
                            batches: report.batches,
                            output_bytes: report.output_bytes,
                        },
                    );
                }
                Ok(report)
            }
            Err(e) => {
                let ctx = self.context();
                error!(path = %self.input.display(), stage = %self.state, error = %e, "import failed");
                self.transition(SessionState::Failed);
                if let Some(obs) = self.options.observer.as_ref() {
                    let sev = ImportSeverity::for_error(&e);
                    obs.on_failure(&ctx, sev, &e);
                    if sev >= self.options.alert_at_or_above {
                        obs.on_alert(&ctx, sev, &e);
                    }
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> ImportResult<ImportReport> {
        // Initializing
        if !self.input.exists() {
            return Err(ImportError::FileNotFound {
                path: self.input.clone(),
            });
        }
        let format = infer_format_from_path(&self.input)?;
        self.format = Some(format);
        info!(path = %self.input.display(), ?format, "input file detected");

        self.transition(SessionState::Resolving);
        let resolved = self.resolve(format)?;

        let (loaded, indexed) = {
            let mut conn = open_store(&self.output)?;
            let tx = conn
                .transaction()
                .map_err(ImportError::storage("begin transaction"))?;

            self.transition(SessionState::Loading);
            let loaded = self.load(&tx, &resolved.source)?;

            self.transition(SessionState::Indexing);
            let indexed = self.index(&tx)?;

            tx.commit().map_err(ImportError::storage("commit"))?;
            (loaded, indexed)
        };

        let output_bytes = fs::metadata(&self.output).map(|m| m.len()).unwrap_or(0);
        Ok(ImportReport {
            input: self.input.clone(),
            output: self.output.clone(),
            table: self.options.table_name.clone(),
            format,
            encoding: resolved.source.encoding(),
            delimiter: resolved.source.dialect().map(|d| char::from(d.delimiter)),
            permissive_dialect: resolved.permissive,
            columns: loaded.schema.columns().to_vec(),
            rows: loaded.rows,
            batches: loaded.batches,
            malformed_rows: loaded.malformed,
            schema_warnings: loaded.drift,
            key_index: indexed.key_index,
            surrogate_id_added: indexed.surrogate_id_added,
            search_index: indexed.search,
            output_bytes,
        })
    }

    fn resolve(&self, format: SourceFormat) -> ImportResult<Resolved> {
        match format {
            SourceFormat::Spreadsheet => Ok(Resolved {
                source: SourceDescriptor::spreadsheet(&self.input),
                permissive: false,
            }),
            SourceFormat::DelimitedText => {
                let resolution = EncodingResolver::new(
                    &self.options.encodings,
                    self.options.delimiter,
                    self.options.batch_size,
                )
                .resolve(&self.input)?;
                for attempt in resolution.attempts.iter().filter(|a| a.error.is_some()) {
                    info!(encoding = %attempt.encoding, reason = ?attempt.error, "encoding rejected");
                }
                let source = resolution.descriptor;
                info!(
                    encoding = ?source.encoding(),
                    delimiter = ?source.dialect().map(|d| char::from(d.delimiter)),
                    permissive = resolution.permissive,
                    "reading delimited file"
                );
                Ok(Resolved {
                    source,
                    permissive: resolution.permissive,
                })
            }
        }
    }

    fn load(&self, conn: &Connection, source: &SourceDescriptor) -> ImportResult<Loaded> {
        let text_column = &self.options.text_column;
        let mirror = self.options.mirror_column();

        let mut reader = TabularReader::open(source, self.options.batch_size)?;
        let mut tracker = SchemaTracker::new(self.options.schema_policy);
        let mut loader = TransactionalLoader::new(self.options.table_name.as_str());
        let mut malformed = 0u64;

        while let Some(batch) = reader.next() {
            let batch = batch?;
            malformed += self.report_malformed(&mut reader);

            let batch = with_upper_mirror(batch, text_column, &mirror);
            if let SchemaCheck::Drift { message } = tracker.observe(&batch)? {
                warn!(table = %loader.table(), batch = loader.batches(), %message, "schema drift");
                self.warn(&ImportError::SchemaMismatch { message });
            }
            let Some(schema) = tracker.schema() else {
                continue;
            };

            let index = loader.batches();
            let rows = loader.load_batch(conn, &batch, schema, index == 0)?;
            if index == 0 {
                info!(table = %loader.table(), "table created; importing rows");
            }
            info!(table = %loader.table(), total = loader.rows(), "imported rows");
            if let Some(obs) = self.options.observer.as_ref() {
                obs.on_batch(
                    &self.context(),
                    BatchProgress {
                        index,
                        rows,
                        total_rows: loader.rows(),
                    },
                );
            }
        }
        malformed += self.report_malformed(&mut reader);

        let schema = match tracker.schema() {
            Some(schema) => schema.clone(),
            None => {
                // Header-only input: the table still gets created, empty.
                let mut columns = reader.columns().to_vec();
                let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
                if has(text_column) && !has(&mirror) {
                    columns.push(mirror.clone());
                }
                let schema = tracker.establish(&columns).clone();
                loader.create_table(conn, &schema)?;
                schema
            }
        };

        Ok(Loaded {
            schema,
            rows: loader.rows(),
            batches: loader.batches(),
            malformed,
            drift: tracker.drift_count(),
        })
    }

    fn index(&self, conn: &Connection) -> ImportResult<Indexed> {
        if !self.options.build_indexes {
            info!("index building disabled");
            return Ok(Indexed {
                key_index: false,
                surrogate_id_added: false,
                search: SearchIndexKind::None,
            });
        }

        info!(table = %self.options.table_name, "building indexes");
        let mirror = self.options.mirror_column();
        let outcome = IndexBuilder::new(
            &self.options.table_name,
            &self.options.key_column,
            &self.options.id_column,
            &mirror,
        )
        .tokenizer(&self.options.search_tokenizer)
        .build(conn)?;

        if let Some(e) = outcome.search_error.as_ref() {
            self.warn(e);
        }
        Ok(Indexed {
            key_index: outcome.key_index,
            surrogate_id_added: outcome.surrogate_id_added,
            search: outcome.search,
        })
    }

    fn report_malformed(&self, reader: &mut TabularReader) -> u64 {
        let skipped = reader.take_malformed();
        for e in &skipped {
            self.warn(e);
        }
        skipped.len() as u64
    }

    fn warn(&self, warning: &ImportError) {
        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_warning(&self.context(), warning);
        }
    }

    fn transition(&mut self, next: SessionState) {
        self.state = next;
        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_stage(&self.context());
        }
    }

    fn context(&self) -> ImportContext {
        ImportContext {
            path: self.input.clone(),
            output: self.output.clone(),
            table: self.options.table_name.clone(),
            format: self.format,
            stage: self.state,
        }
    }
}

/// Import `input` into `output` with `options`.
pub fn import_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ImportOptions,
) -> ImportResult<ImportReport> {
    ImportSession::new(input.as_ref(), output.as_ref(), options.clone()).run()
}

//! `tabload` loads a single tabular file (CSV or a one-sheet `.xlsx` workbook) into a SQLite
//! table and makes a designated text column searchable.
//!
//! The entrypoint is [`session::import_file`] (or [`session::ImportSession`] for access to the
//! session state). One call:
//!
//! 1. picks the format from the file extension (`.csv` / `.xlsx`);
//! 2. for CSV, sniffs the delimiter (`;` vs `,`) and finds a working text encoding by probing an
//!    ordered cascade (UTF-8, Latin-1, UTF-16, Windows-1252, then a permissive Latin-1 dialect);
//! 3. streams the rows in batches of 10 000 into the target table, all values as text, adding an
//!    uppercase mirror of the description column;
//! 4. indexes the key column, adds a surrogate `id` when the input has none, and builds an FTS5
//!    index over the mirror, or a plain index when FTS5 is unavailable.
//!
//! ## Quick example
//!
//! ```no_run
//! use tabload::session::{ImportOptions, import_file};
//!
//! # fn main() -> Result<(), tabload::ImportError> {
//! let opts = ImportOptions {
//!     table_name: "inventario".to_string(),
//!     delimiter: Some(b';'),
//!     ..Default::default()
//! };
//! let report = import_file("inventario.csv", "inventario.db", &opts)?;
//! println!("rows={} encoding={:?}", report.rows, report.encoding);
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! The library logs through `tracing` and never installs a subscriber. Outcomes, per-batch
//! progress and recoverable warnings are also delivered to an optional
//! [`ingestion::ImportObserver`] set on [`session::ImportOptions::observer`].
//!
//! ## Modules
//!
//! - [`session`]: the import state machine and its options/report
//! - [`ingestion`]: encoding resolution, batch readers, schema tracking, observers
//! - [`store`]: output connection, table loader, index builder
//! - [`types`]: source descriptor, schema and batch types
//! - [`discovery`]: input discovery and output path helpers for the CLI
//! - [`error`]: the crate-wide error type

pub mod discovery;
pub mod error;
pub mod ingestion;
pub mod session;
pub mod store;
pub mod types;

pub use error::{ImportError, ImportResult};
pub use session::{ImportOptions, ImportReport, ImportSession, SessionState, import_file};

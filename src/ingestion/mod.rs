//! Reading side of the pipeline: from a file on disk to a sequence of [`crate::types::RowBatch`]es.
//!
//! - [`encoding`]: delimiter sniffing and the encoding cascade ([`EncodingResolver`])
//! - [`csv`]: streamed delimited-text batches
//! - `excel`: materialised single-sheet batches (feature `excel`)
//! - [`reader`]: [`TabularReader`], one iterator over both formats
//! - [`schema`]: [`SchemaTracker`] and header normalisation
//! - [`observability`]: the [`ImportObserver`] sink and stock observers

pub mod csv;
pub mod encoding;
#[cfg(feature = "excel")]
pub mod excel;
pub mod observability;
pub mod reader;
pub mod schema;

pub use encoding::{EncodingAttempt, EncodingResolver, Resolution, sniff_delimiter};
pub use observability::{
    BatchProgress, CompositeObserver, FileObserver, ImportContext, ImportObserver, ImportSeverity,
    ImportStats, TracingObserver,
};
pub use reader::{TabularReader, infer_format_from_path};
pub use schema::{SchemaCheck, SchemaPolicy, SchemaTracker};

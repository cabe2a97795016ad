use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::error::ImportError;
use crate::session::SessionState;
use crate::types::SourceFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportSeverity {
    /// Informational event.
    Info,
    /// Recoverable problem; the session continues.
    Warning,
    /// The session failed.
    Error,
    /// Infrastructure failure (missing input, I/O, storage engine).
    Critical,
}

impl ImportSeverity {
    /// Severity for an error surfaced by the pipeline.
    pub fn for_error(e: &ImportError) -> Self {
        match e {
            ImportError::Io(_) | ImportError::FileNotFound { .. } => Self::Critical,
            ImportError::StorageWrite { .. } | ImportError::KeyIndex { .. } => Self::Critical,
            ImportError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            e if e.is_recoverable() => Self::Warning,
            _ => Self::Error,
        }
    }
}

/// Where a session is and what it is working on.
#[derive(Debug, Clone)]
pub struct ImportContext {
    /// Input file.
    pub path: PathBuf,
    /// Output store.
    pub output: PathBuf,
    /// Target table.
    pub table: String,
    /// Input format, once known.
    pub format: Option<SourceFormat>,
    /// Session state when the event was raised.
    pub stage: SessionState,
}

/// Progress after one batch has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Zero-based batch index.
    pub index: usize,
    /// Rows in this batch.
    pub rows: usize,
    /// Rows written so far in the session.
    pub total_rows: u64,
}

/// Stats reported on a committed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub rows: u64,
    pub batches: usize,
    pub output_bytes: u64,
}

/// Observer interface for import progress and outcomes.
///
/// This is the injectable sink of the pipeline: implementors can record metrics, write logs, or
/// trigger alerts. Every method has a no-op default.
pub trait ImportObserver: Send + Sync {
    /// Called on every state transition.
    fn on_stage(&self, _ctx: &ImportContext) {}

    /// Called after each batch is written.
    fn on_batch(&self, _ctx: &ImportContext, _progress: BatchProgress) {}

    /// Called for recoverable problems (skipped rows, schema drift, search index fallback).
    fn on_warning(&self, _ctx: &ImportContext, _warning: &ImportError) {}

    /// Called when the session commits.
    fn on_success(&self, _ctx: &ImportContext, _stats: ImportStats) {}

    /// Called when the session fails.
    fn on_failure(&self, _ctx: &ImportContext, _severity: ImportSeverity, _error: &ImportError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ImportObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn ImportObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ImportObserver for CompositeObserver {
    fn on_stage(&self, ctx: &ImportContext) {
        for o in &self.observers {
            o.on_stage(ctx);
        }
    }

    fn on_batch(&self, ctx: &ImportContext, progress: BatchProgress) {
        for o in &self.observers {
            o.on_batch(ctx, progress);
        }
    }

    fn on_warning(&self, ctx: &ImportContext, warning: &ImportError) {
        for o in &self.observers {
            o.on_warning(ctx, warning);
        }
    }

    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards events to `tracing`, under the `tabload::observer` target.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ImportObserver for TracingObserver {
    fn on_batch(&self, ctx: &ImportContext, progress: BatchProgress) {
        info!(
            target: "tabload::observer",
            table = %ctx.table,
            batch = progress.index,
            rows = progress.rows,
            total = progress.total_rows,
            "batch written"
        );
    }

    fn on_warning(&self, ctx: &ImportContext, warning: &ImportError) {
        warn!(
            target: "tabload::observer",
            path = %ctx.path.display(),
            stage = ?ctx.stage,
            "{warning}"
        );
    }

    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        info!(
            target: "tabload::observer",
            path = %ctx.path.display(),
            output = %ctx.output.display(),
            rows = stats.rows,
            batches = stats.batches,
            bytes = stats.output_bytes,
            "import committed"
        );
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        error!(
            target: "tabload::observer",
            path = %ctx.path.display(),
            stage = ?ctx.stage,
            ?severity,
            "{error}"
        );
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        error!(
            target: "tabload::observer",
            alert = true,
            path = %ctx.path.display(),
            stage = ?ctx.stage,
            ?severity,
            "{error}"
        );
    }
}

/// Appends import events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl ImportObserver for FileObserver {
    fn on_batch(&self, ctx: &ImportContext, progress: BatchProgress) {
        self.append_line(&format!(
            "{} batch table={} index={} rows={} total={}",
            unix_ts(),
            ctx.table,
            progress.index,
            progress.rows,
            progress.total_rows
        ));
    }

    fn on_warning(&self, ctx: &ImportContext, warning: &ImportError) {
        self.append_line(&format!(
            "{} warn stage={:?} path={} msg={}",
            unix_ts(),
            ctx.stage,
            ctx.path.display(),
            warning
        ));
    }

    fn on_success(&self, ctx: &ImportContext, stats: ImportStats) {
        self.append_line(&format!(
            "{} ok format={:?} path={} table={} rows={} bytes={}",
            unix_ts(),
            ctx.format,
            ctx.path.display(),
            ctx.table,
            stats.rows,
            stats.output_bytes
        ));
    }

    fn on_failure(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        self.append_line(&format!(
            "{} fail severity={:?} stage={:?} path={} err={}",
            unix_ts(),
            severity,
            ctx.stage,
            ctx.path.display(),
            error
        ));
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} stage={:?} path={} err={}",
            unix_ts(),
            severity,
            ctx.stage,
            ctx.path.display(),
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use super::{CompositeObserver, ImportContext, ImportObserver, ImportSeverity, TracingObserver};
    use crate::error::ImportError;
    use crate::session::SessionState;

    #[derive(Default)]
    struct Counter {
        warnings: Mutex<usize>,
        failures: Mutex<usize>,
    }

    impl ImportObserver for Counter {
        fn on_warning(&self, _ctx: &ImportContext, _warning: &ImportError) {
            *self.warnings.lock().unwrap() += 1;
        }

        fn on_failure(&self, _ctx: &ImportContext, _severity: ImportSeverity, _error: &ImportError) {
            *self.failures.lock().unwrap() += 1;
        }
    }

    fn ctx() -> ImportContext {
        ImportContext {
            path: PathBuf::from("in.csv"),
            output: PathBuf::from("out.db"),
            table: "t".to_string(),
            format: None,
            stage: SessionState::Loading,
        }
    }

    #[test]
    fn severity_follows_error_kind() {
        let missing = ImportError::FileNotFound {
            path: PathBuf::from("x.csv"),
        };
        let skipped = ImportError::MalformedRow {
            line: 2,
            message: "expected 2 fields, saw 3".to_string(),
        };
        let drift = ImportError::SchemaMismatch {
            message: "columns differ".to_string(),
        };
        assert_eq!(ImportSeverity::for_error(&missing), ImportSeverity::Critical);
        assert_eq!(ImportSeverity::for_error(&skipped), ImportSeverity::Warning);
        assert_eq!(ImportSeverity::for_error(&drift), ImportSeverity::Error);
        assert!(ImportSeverity::Critical > ImportSeverity::Error);
    }

    #[test]
    fn composite_fans_out_and_alert_defaults_to_failure() {
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let observers: Vec<Arc<dyn ImportObserver>> = vec![a.clone(), b.clone(), Arc::new(TracingObserver)];
        let all = CompositeObserver::new(observers);

        let err = ImportError::MalformedRow {
            line: 3,
            message: "bad".to_string(),
        };
        all.on_warning(&ctx(), &err);
        all.on_alert(&ctx(), ImportSeverity::Critical, &err);

        for o in [&a, &b] {
            assert_eq!(*o.warnings.lock().unwrap(), 1);
            assert_eq!(*o.failures.lock().unwrap(), 1);
        }
    }
}

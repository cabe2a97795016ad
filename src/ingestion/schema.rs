//! Column-set tracking across batches.
//!
//! The first batch of a session fixes the [`TableSchema`], including computed columns such as the
//! uppercase mirror of the description column. Later batches are appended positionally; a batch
//! whose columns differ is reported as drift (or rejected under [`SchemaPolicy::Strict`]).

use std::collections::HashSet;

use crate::error::{ImportError, ImportResult};
use crate::types::{RowBatch, TableSchema};

/// What to do when a later batch's columns differ from the frozen schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaPolicy {
    /// Report a warning and append positionally.
    #[default]
    Warn,
    /// Fail the session with [`ImportError::SchemaMismatch`].
    Strict,
}

/// Result of checking one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    /// This batch fixed the schema.
    Established,
    Conforms,
    /// Columns differ; only returned under [`SchemaPolicy::Warn`].
    Drift { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct SchemaTracker {
    policy: SchemaPolicy,
    schema: Option<TableSchema>,
    drift: usize,
}

impl SchemaTracker {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self {
            policy,
            schema: None,
            drift: 0,
        }
    }

    /// The frozen schema, once the first batch has been observed.
    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    /// Number of batches reported as drifting.
    pub fn drift_count(&self) -> usize {
        self.drift
    }

    /// Fix the schema from a column list when no batch will arrive (header-only input).
    pub fn establish(&mut self, columns: &[String]) -> &TableSchema {
        self.schema
            .get_or_insert_with(|| TableSchema::new(columns.to_vec()))
    }

    pub fn observe(&mut self, batch: &RowBatch) -> ImportResult<SchemaCheck> {
        let Some(schema) = &self.schema else {
            self.schema = Some(TableSchema::new(batch.columns().to_vec()));
            return Ok(SchemaCheck::Established);
        };
        if schema.columns() == batch.columns() {
            return Ok(SchemaCheck::Conforms);
        }

        let message = format!(
            "batch columns {:?} differ from table columns {:?}",
            batch.columns(),
            schema.columns()
        );
        match self.policy {
            SchemaPolicy::Strict => Err(ImportError::SchemaMismatch { message }),
            SchemaPolicy::Warn => {
                self.drift += 1;
                Ok(SchemaCheck::Drift { message })
            }
        }
    }
}

/// Clean raw header cells into unique, non-empty column names.
///
/// Headers are trimmed; an empty header at position `i` becomes `Unnamed: i`; repeated names get
/// `.1`, `.2`, ... suffixes in order of appearance. Names that differ only in ASCII case count
/// as repeats, since the store does not tell them apart.
pub fn normalize_headers<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (idx, header) in raw.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {idx}"),
            h => h.to_owned(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while seen.contains(&name.to_ascii_lowercase()) {
            name = format!("{base}.{n}");
            n += 1;
        }
        seen.insert(name.to_ascii_lowercase());
        out.push(name);
    }
    out
}

/// Name of the uppercase mirror of `text_column`.
pub fn mirror_column_name(text_column: &str, suffix: &str) -> String {
    format!("{text_column}{suffix}")
}

/// Add the uppercase mirror of `text_column` to a batch, if the column is present.
pub fn with_upper_mirror(batch: RowBatch, text_column: &str, mirror: &str) -> RowBatch {
    batch.with_derived_column(text_column, mirror, str::to_uppercase)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{SchemaCheck, SchemaPolicy, SchemaTracker, normalize_headers, with_upper_mirror};
    use crate::types::RowBatch;

    fn batch(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> RowBatch {
        RowBatch::new(
            Arc::new(columns.iter().map(|c| c.to_string()).collect()),
            rows.into_iter()
                .map(|r| r.into_iter().map(|v| v.map(str::to_owned)).collect())
                .collect(),
        )
    }

    #[test]
    fn first_batch_establishes_then_conforms() {
        let mut tracker = SchemaTracker::new(SchemaPolicy::Warn);
        let b = batch(&["id", "descricao"], vec![vec![Some("1"), Some("x")]]);
        assert_eq!(tracker.observe(&b).unwrap(), SchemaCheck::Established);
        assert_eq!(tracker.observe(&b).unwrap(), SchemaCheck::Conforms);
        assert_eq!(tracker.schema().unwrap().columns(), ["id", "descricao"]);
    }

    #[test]
    fn drift_warns_by_default_and_fails_when_strict() {
        let first = batch(&["id", "descricao"], vec![]);
        let other = batch(&["id", "nome"], vec![]);

        let mut warn = SchemaTracker::new(SchemaPolicy::Warn);
        warn.observe(&first).unwrap();
        assert!(matches!(warn.observe(&other).unwrap(), SchemaCheck::Drift { .. }));
        assert_eq!(warn.drift_count(), 1);
        assert_eq!(warn.schema().unwrap().columns(), ["id", "descricao"]);

        let mut strict = SchemaTracker::new(SchemaPolicy::Strict);
        strict.observe(&first).unwrap();
        let err = strict.observe(&other).unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));
    }

    #[test]
    fn headers_are_trimmed_named_and_deduplicated() {
        let cols = normalize_headers([" id ", "", "valor", "valor", "valor"]);
        assert_eq!(cols, ["id", "Unnamed: 1", "valor", "valor.1", "valor.2"]);
    }

    #[test]
    fn headers_differing_only_in_case_are_deduplicated() {
        let cols = normalize_headers(["id", "ID", "Valor", "valor.1", "VALOR"]);
        assert_eq!(cols, ["id", "ID.1", "Valor", "valor.1", "VALOR.2"]);
    }

    #[test]
    fn upper_mirror_finds_text_column_regardless_of_case() {
        let b = batch(&["CODIGO", "Descricao"], vec![vec![Some("1"), Some("mesa")]]);
        let b = with_upper_mirror(b, "descricao", "descricao_upper");
        assert_eq!(b.columns(), ["CODIGO", "Descricao", "descricao_upper"]);
        assert_eq!(b.rows()[0][2].as_deref(), Some("MESA"));
    }

    #[test]
    fn upper_mirror_appends_uppercased_copy() {
        let b = batch(
            &["codigo", "descricao"],
            vec![vec![Some("1"), Some("cadeira giratória")], vec![Some("2"), None]],
        );
        let b = with_upper_mirror(b, "descricao", "descricao_upper");
        assert_eq!(b.columns(), ["codigo", "descricao", "descricao_upper"]);
        assert_eq!(b.rows()[0][2].as_deref(), Some("CADEIRA GIRATÓRIA"));
        assert_eq!(b.rows()[1][2], None);
    }

    #[test]
    fn upper_mirror_skips_batches_without_text_column() {
        let b = batch(&["codigo"], vec![vec![Some("1")]]);
        let b = with_upper_mirror(b, "descricao", "descricao_upper");
        assert_eq!(b.columns(), ["codigo"]);
    }
}

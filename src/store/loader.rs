//! Batch writer for the target table.

use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

use crate::error::{ImportError, ImportResult};
use crate::types::{RowBatch, TableSchema};

use super::quote_ident;

/// Writes batches into one table.
///
/// The first batch replaces any existing table of the same name (and its full-text mirror) and
/// creates it from the frozen [`TableSchema`], every column typed `TEXT`. Later batches are
/// appended positionally in schema order. The loader does not manage transactions: the caller
/// passes the connection (or open transaction) that should receive the writes.
#[derive(Debug, Clone)]
pub struct TransactionalLoader {
    table: String,
    rows: u64,
    batches: usize,
}

impl TransactionalLoader {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: 0,
            batches: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Batches written so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Drop any previous table of this name and create it from `schema`.
    pub fn create_table(&self, conn: &Connection, schema: &TableSchema) -> ImportResult<()> {
        let table = quote_ident(&self.table);
        let fts = quote_ident(&format!("{}_fts", self.table));
        let columns = schema
            .columns()
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {fts};
             DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} ({columns});"
        ))
        .map_err(ImportError::storage("create table"))?;
        info!(table = %self.table, columns = schema.len(), "table created");
        Ok(())
    }

    /// Persist one batch. Returns the number of rows written.
    ///
    /// Rows shorter than the schema are padded with NULL; longer rows are truncated.
    pub fn load_batch(
        &mut self,
        conn: &Connection,
        batch: &RowBatch,
        schema: &TableSchema,
        is_first: bool,
    ) -> ImportResult<usize> {
        if is_first {
            self.create_table(conn, schema)?;
        }

        let width = schema.len();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            schema
                .columns()
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            (1..=width).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
        );
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(ImportError::storage("insert"))?;

        for row in batch.rows() {
            let values = (0..width).map(|i| row.get(i).and_then(|v| v.as_deref()));
            stmt.execute(params_from_iter(values))
                .map_err(ImportError::storage("insert"))?;
        }

        self.rows += batch.len() as u64;
        self.batches += 1;
        debug!(table = %self.table, batch = self.batches, rows = batch.len(), "batch inserted");
        Ok(batch.len())
    }
}

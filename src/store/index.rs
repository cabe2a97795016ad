//! Post-load index construction.
//!
//! Runs once after the last batch:
//!
//! 1. a non-unique lookup index on the key column, when the table has one;
//! 2. a surrogate integer identifier (filled from `rowid`, kept filled for later inserts by a
//!    trigger) plus a unique index on it, when the table has no identifier column;
//! 3. an FTS5 table over the uppercase text mirror, content-backed by the target table, then a
//!    full `rebuild`;
//! 4. if step 3 fails, a conventional index on the mirror column instead.
//!
//! Steps 1 and 2 are fatal on failure. Step 3 runs inside a savepoint, so a failed attempt leaves
//! nothing behind before the fallback runs. Every step is safe to run again.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ImportError, ImportResult};

use super::{quote_ident, quote_literal, table_columns};

/// Tokenizer used for the full-text index unless configured otherwise.
pub const DEFAULT_TOKENIZER: &str = "porter unicode61";

/// Which search structure ended up over the text mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchIndexKind {
    /// FTS5 virtual table `<table>_fts`.
    FullText,
    /// Plain index `idx_<table>_<mirror>`.
    Conventional,
    /// The table has no text mirror column.
    None,
}

/// What [`IndexBuilder::build`] did.
#[derive(Debug)]
pub struct IndexOutcome {
    /// Lookup index on the key column exists.
    pub key_index: bool,
    /// A surrogate identifier column was added by this run.
    pub surrogate_id_added: bool,
    pub search: SearchIndexKind,
    /// The full-text failure that triggered the conventional fallback.
    pub search_error: Option<ImportError>,
}

#[derive(Debug, Clone)]
pub struct IndexBuilder<'a> {
    table: &'a str,
    key_column: &'a str,
    id_column: &'a str,
    mirror_column: &'a str,
    tokenizer: &'a str,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(table: &'a str, key_column: &'a str, id_column: &'a str, mirror_column: &'a str) -> Self {
        Self {
            table,
            key_column,
            id_column,
            mirror_column,
            tokenizer: DEFAULT_TOKENIZER,
        }
    }

    /// Override the FTS5 `tokenize` argument.
    pub fn tokenizer(mut self, tokenizer: &'a str) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Name of the full-text table for `table`.
    pub fn fts_table_name(table: &str) -> String {
        format!("{table}_fts")
    }

    fn index_name(&self, column: &str) -> String {
        format!("idx_{}_{}", self.table, column)
    }

    pub fn build(&self, conn: &Connection) -> ImportResult<IndexOutcome> {
        let columns = table_columns(conn, self.table).map_err(ImportError::storage("describe table"))?;
        // SQLite resolves column names case-insensitively.
        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));

        let key_index = has(self.key_column);
        if key_index {
            self.create_key_index(conn)?;
        } else {
            info!(table = self.table, column = self.key_column, "no key column; lookup index skipped");
        }

        let surrogate_id_added = !has(self.id_column);
        if surrogate_id_added {
            self.add_surrogate_id(conn)?;
        }

        if !has(self.mirror_column) {
            info!(table = self.table, column = self.mirror_column, "no text column; search index skipped");
            return Ok(IndexOutcome {
                key_index,
                surrogate_id_added,
                search: SearchIndexKind::None,
                search_error: None,
            });
        }

        let (search, search_error) = match self.create_full_text(conn) {
            Ok(()) => {
                info!(table = self.table, "full-text index built");
                (SearchIndexKind::FullText, None)
            }
            Err(e) => {
                warn!(table = self.table, error = %e, "full-text index not created; using conventional index for text");
                self.create_text_index(conn)?;
                (SearchIndexKind::Conventional, Some(e))
            }
        };

        Ok(IndexOutcome {
            key_index,
            surrogate_id_added,
            search,
            search_error,
        })
    }

    fn create_key_index(&self, conn: &Connection) -> ImportResult<()> {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            quote_ident(&self.index_name(self.key_column)),
            quote_ident(self.table),
            quote_ident(self.key_column)
        ))
        .map_err(|source| ImportError::KeyIndex {
            column: self.key_column.to_string(),
            source,
        })
    }

    fn add_surrogate_id(&self, conn: &Connection) -> ImportResult<()> {
        let table = quote_ident(self.table);
        let id = quote_ident(self.id_column);
        let index = quote_ident(&self.index_name(self.id_column));
        let trigger = quote_ident(&format!("{}_{}_autoinc", self.table, self.id_column));

        conn.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {id} INTEGER;
             UPDATE {table} SET {id} = rowid;
             CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table}({id});
             CREATE TRIGGER IF NOT EXISTS {trigger} AFTER INSERT ON {table}
             WHEN NEW.{id} IS NULL
             BEGIN
                 UPDATE {table} SET {id} = NEW.rowid WHERE rowid = NEW.rowid;
             END;"
        ))
        .map_err(|source| ImportError::KeyIndex {
            column: self.id_column.to_string(),
            source,
        })?;
        info!(table = self.table, column = self.id_column, "surrogate identifier added");
        Ok(())
    }

    fn create_full_text(&self, conn: &Connection) -> ImportResult<()> {
        let fts = quote_ident(&Self::fts_table_name(self.table));
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
                 {mirror},
                 content={content},
                 content_rowid=rowid,
                 tokenize={tokenize}
             );
             INSERT INTO {fts}({fts}) VALUES('rebuild');",
            mirror = quote_ident(self.mirror_column),
            content = quote_literal(self.table),
            tokenize = quote_literal(self.tokenizer),
        );

        conn.execute_batch("SAVEPOINT search_index")
            .map_err(|source| ImportError::SearchIndexUnavailable { source })?;
        match conn.execute_batch(&sql) {
            Ok(()) => conn
                .execute_batch("RELEASE search_index")
                .map_err(|source| ImportError::SearchIndexUnavailable { source }),
            Err(source) => {
                conn.execute_batch("ROLLBACK TO search_index; RELEASE search_index")
                    .map_err(ImportError::storage("search index rollback"))?;
                Err(ImportError::SearchIndexUnavailable { source })
            }
        }
    }

    fn create_text_index(&self, conn: &Connection) -> ImportResult<()> {
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            quote_ident(&self.index_name(self.mirror_column)),
            quote_ident(self.table),
            quote_ident(self.mirror_column)
        ))
        .map_err(ImportError::storage("text index"))
    }
}

//! Output store: the SQLite file an import session writes into.
//!
//! The session owns exactly one [`Connection`] for its lifetime (see [`open_store`]). Writers in
//! [`loader`] and [`index`] borrow it, normally through the session's open transaction.

pub mod index;
pub mod loader;

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{ImportError, ImportResult};

pub use index::{IndexBuilder, IndexOutcome, SearchIndexKind};
pub use loader::TransactionalLoader;

/// Open (or create) the output store.
pub fn open_store(path: &Path) -> ImportResult<Connection> {
    Connection::open(path).map_err(ImportError::storage("open"))
}

/// Quote an SQL identifier (table, column or index name).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Column names of `table`, in declaration order. Empty if the table does not exist.
///
/// This is the single place the pipeline asks the store what a table looks like.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Whether a schema object (`table`, `index`, `trigger`, ...) named `name` exists.
pub fn object_exists(conn: &Connection, kind: &str, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
        [kind, name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Number of rows in `table`.
pub fn row_count(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{object_exists, quote_ident, quote_literal, row_count, table_columns};

    #[test]
    fn identifiers_and_literals_are_escaped() {
        assert_eq!(quote_ident("descricao"), "\"descricao\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn schema_description_reflects_the_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(table_columns(&conn, "t").unwrap().is_empty());

        conn.execute_batch("CREATE TABLE \"t\" (\"codigo\" TEXT, \"valor total\" TEXT); INSERT INTO t VALUES ('1', '2');")
            .unwrap();
        assert_eq!(table_columns(&conn, "t").unwrap(), ["codigo", "valor total"]);
        assert!(object_exists(&conn, "table", "t").unwrap());
        assert!(!object_exists(&conn, "index", "t").unwrap());
        assert_eq!(row_count(&conn, "t").unwrap(), 1);
    }
}

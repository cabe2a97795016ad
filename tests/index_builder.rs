use rusqlite::Connection;
use tabload::ImportError;
use tabload::store::{IndexBuilder, SearchIndexKind, object_exists, row_count, table_columns};

fn seeded(columns: &str, rows: &[&str]) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("CREATE TABLE bens ({columns});"))
        .unwrap();
    for row in rows {
        conn.execute_batch(&format!("INSERT INTO bens VALUES ({row});"))
            .unwrap();
    }
    conn
}

#[test]
fn key_index_surrogate_id_and_full_text_are_built() {
    let conn = seeded(
        "codigo TEXT, descricao TEXT, descricao_upper TEXT",
        &[
            "'A1', 'mesa de reuniao', 'MESA DE REUNIAO'",
            "'A2', 'cadeira giratoria', 'CADEIRA GIRATORIA'",
            "'A3', 'mesa lateral', 'MESA LATERAL'",
        ],
    );

    let outcome = IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .build(&conn)
        .unwrap();
    assert!(outcome.key_index);
    assert!(outcome.surrogate_id_added);
    assert_eq!(outcome.search, SearchIndexKind::FullText);
    assert!(outcome.search_error.is_none());

    assert!(object_exists(&conn, "index", "idx_bens_codigo").unwrap());
    assert!(object_exists(&conn, "index", "idx_bens_id").unwrap());
    assert!(object_exists(&conn, "table", "bens_fts").unwrap());

    let ids: Vec<i64> = conn
        .prepare("SELECT id FROM bens ORDER BY rowid")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids, [1, 2, 3]);

    let hits: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bens_fts WHERE bens_fts MATCH 'MESA'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(hits, 2);
}

#[test]
fn surrogate_id_is_unique_and_filled_for_later_inserts() {
    let conn = seeded("descricao TEXT", &["'um'", "'dois'"]);
    IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .build(&conn)
        .unwrap();

    conn.execute_batch("INSERT INTO bens (descricao) VALUES ('tres');")
        .unwrap();
    let id: i64 = conn
        .query_row("SELECT id FROM bens WHERE descricao = 'tres'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(id, 3);

    let dup = conn.execute_batch("INSERT INTO bens (descricao, id) VALUES ('quatro', 1);");
    assert!(dup.is_err());
}

#[test]
fn rebuilding_is_idempotent() {
    let conn = seeded(
        "codigo TEXT, descricao_upper TEXT",
        &["'1', 'MESA'", "'2', 'ARMARIO'"],
    );
    let builder = IndexBuilder::new("bens", "codigo", "id", "descricao_upper");

    let first = builder.build(&conn).unwrap();
    assert!(first.surrogate_id_added);
    let second = builder.build(&conn).unwrap();
    assert!(!second.surrogate_id_added);
    assert_eq!(second.search, SearchIndexKind::FullText);

    let columns = table_columns(&conn, "bens").unwrap();
    assert_eq!(columns, ["codigo", "descricao_upper", "id"]);
    assert_eq!(row_count(&conn, "bens").unwrap(), 2);
}

#[test]
fn existing_identifier_is_left_alone() {
    let conn = seeded("id TEXT, descricao_upper TEXT", &["'x9', 'MESA'"]);
    let outcome = IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .build(&conn)
        .unwrap();
    assert!(!outcome.key_index);
    assert!(!outcome.surrogate_id_added);
    assert!(!object_exists(&conn, "index", "idx_bens_codigo").unwrap());

    let id: String = conn
        .query_row("SELECT id FROM bens", [], |r| r.get(0))
        .unwrap();
    assert_eq!(id, "x9");
}

#[test]
fn rejected_full_text_falls_back_to_conventional_index() {
    let conn = seeded("codigo TEXT, descricao_upper TEXT", &["'1', 'MESA'"]);
    let outcome = IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .tokenizer("no_such_tokenizer")
        .build(&conn)
        .unwrap();

    assert_eq!(outcome.search, SearchIndexKind::Conventional);
    let err = outcome.search_error.unwrap();
    assert!(matches!(err, ImportError::SearchIndexUnavailable { .. }));
    assert!(err.is_recoverable());

    assert!(!object_exists(&conn, "table", "bens_fts").unwrap());
    assert!(object_exists(&conn, "index", "idx_bens_descricao_upper").unwrap());
    // Earlier steps are unaffected by the rolled-back attempt.
    assert!(object_exists(&conn, "index", "idx_bens_codigo").unwrap());
}

#[test]
fn missing_text_column_skips_search() {
    let conn = seeded("codigo TEXT", &["'1'"]);
    let outcome = IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .build(&conn)
        .unwrap();
    assert_eq!(outcome.search, SearchIndexKind::None);
    assert!(!object_exists(&conn, "table", "bens_fts").unwrap());
}

#[test]
fn column_names_match_regardless_of_case() {
    let conn = seeded(
        "ID TEXT, CODIGO TEXT, Descricao_Upper TEXT",
        &["'7', 'A1', 'MESA'"],
    );
    let outcome = IndexBuilder::new("bens", "codigo", "id", "descricao_upper")
        .build(&conn)
        .unwrap();

    assert!(outcome.key_index);
    assert!(!outcome.surrogate_id_added);
    assert_eq!(outcome.search, SearchIndexKind::FullText);
    assert_eq!(
        table_columns(&conn, "bens").unwrap(),
        ["ID", "CODIGO", "Descricao_Upper"]
    );
}

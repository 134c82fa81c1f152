use hivekeeper_core::db::migrations::latest_version;
use hivekeeper_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "pending_mutations");
    assert_table_exists(&conn, "embedded_rows");
    assert_table_exists(&conn, "embedded_objects");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hivekeeper.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "pending_mutations");
}

#[test]
fn open_db_creates_missing_app_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app").join("data").join("hivekeeper.db");

    let conn = open_db(&path).unwrap();
    assert!(path.exists());
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn queued_mutations_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let conn = open_db(&path).unwrap();
    conn.execute(
        "INSERT INTO pending_mutations (operation, table_name, payload) VALUES ('delete', 'hives', '{}');",
        [],
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    let (operation, attempts): (String, i64) = conn
        .query_row(
            "SELECT operation, attempts FROM pending_mutations;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(operation, "delete");
    assert_eq!(attempts, 0);
}

#[test]
fn pending_mutations_reject_unknown_operations() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO pending_mutations (operation, table_name, payload) VALUES ('upsert', 'hives', '{}');",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn upgrade_keeps_queued_rows_and_allows_storage_cleanups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v2.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_pending_mutations.sql"))
        .unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0002_embedded_backend.sql"))
        .unwrap();
    conn.execute_batch(
        "PRAGMA user_version = 2;
         INSERT INTO pending_mutations (operation, table_name, payload, attempts)
         VALUES ('update', 'hives', '{}', 3);",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let (operation, attempts): (String, i64) = conn
        .query_row(
            "SELECT operation, attempts FROM pending_mutations;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((operation.as_str(), attempts), ("update", 3));

    conn.execute(
        "INSERT INTO pending_mutations (operation, table_name, payload) VALUES ('remove_folder', 'hive-photos', '{}');",
        [],
    )
    .unwrap();
    let next_id: i64 = conn
        .query_row("SELECT MAX(id) FROM pending_mutations;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(next_id, 2);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

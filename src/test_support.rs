// Shared fixtures for sqlite-backed tests.

use crate::config::PoolSettings;
use crate::connections::{ConnectionPoolManager, PooledConnectionHandle};
use crate::db_types::ConnectionCredentials;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;

pub(crate) fn sqlite_path(dir: &TempDir, file: &str) -> String {
    dir.path().join(file).to_string_lossy().into_owned()
}

pub(crate) fn sqlite_credentials(dir: &TempDir, connection_id: &str, file: &str) -> ConnectionCredentials {
    ConnectionCredentials {
        connection_id: connection_id.into(),
        database_type: "sqlite".into(),
        database_name: sqlite_path(dir, file),
        ..Default::default()
    }
}

/// Runs `script` against the database file outside of any engine pool.
pub(crate) async fn seed_sqlite(dir: &TempDir, file: &str, script: &str) {
    let mut conn = SqliteConnectOptions::new()
        .filename(sqlite_path(dir, file))
        .create_if_missing(true)
        .connect()
        .await
        .expect("open sqlite fixture");
    sqlx::raw_sql(script)
        .execute(&mut conn)
        .await
        .expect("seed sqlite fixture");
    conn.close().await.expect("close sqlite fixture");
}

pub(crate) async fn open_sqlite(dir: &TempDir, connection_id: &str, file: &str) -> PooledConnectionHandle {
    ConnectionPoolManager::new(PoolSettings::default())
        .create_and_test(&sqlite_credentials(dir, connection_id, file))
        .await
        .expect("sqlite handle")
}

/// `CREATE TABLE <table> (id INTEGER PRIMARY KEY, name TEXT)` plus rows 1..=count.
pub(crate) fn numbered_table_script(table: &str, count: u32) -> String {
    let mut script = format!("CREATE TABLE {} (id INTEGER PRIMARY KEY, name TEXT NOT NULL);", table);
    for id in 1..=count {
        script.push_str(&format!("INSERT INTO {} (id, name) VALUES ({}, 'row{}');", table, id, id));
    }
    script
}

// =====================================================
// SQLITE POOL BACKEND
// =====================================================

use crate::config::PoolSettings;
use crate::db_types::{BindValue, RecordBatch};
use crate::dialect::Endpoint;
use crate::error::{classify_sqlx_connect_error, map_sqlx_error, BridgeError, BridgeResult, ConnectFailure};
use futures::StreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::ConnectOptions;
use sqlx::{Column, Either, Pool, Row, Sqlite, ValueRef};

// --- Connection ---

fn build_connect_options(db_path: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .log_statements(log::LevelFilter::Debug)
}

/// `endpoint.database` is the database file path.
pub async fn create_pool(endpoint: &Endpoint, settings: &PoolSettings) -> BridgeResult<Pool<Sqlite>> {
    if endpoint.database.is_empty() {
        return Err(BridgeError::connect(
            ConnectFailure::Configuration,
            "Database file path is required",
        ));
    }

    SqlitePoolOptions::new()
        .max_connections(settings.max_size)
        .min_connections(settings.min_idle)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect_with(build_connect_options(&endpoint.database))
        .await
        .map_err(|e| {
            log::warn!("Failed to open SQLite database {}: {}", endpoint.database, e);
            BridgeError::connect(classify_sqlx_connect_error(&e), e.to_string())
        })
}

// --- Query Execution ---

pub async fn fetch_records(pool: &Pool<Sqlite>, sql: &str) -> BridgeResult<RecordBatch> {
    let mut stream = sqlx::raw_sql(sql).fetch_many(pool);
    let mut last = RecordBatch::default();
    let mut current = RecordBatch::default();

    while let Some(item) = stream.next().await {
        match item.map_err(map_sqlx_error)? {
            Either::Left(_done) => {
                if !current.columns.is_empty() {
                    last = std::mem::take(&mut current);
                }
            }
            Either::Right(row) => {
                if current.columns.is_empty() {
                    current.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                current.rows.push((0..row.len()).map(|i| decode_value(&row, i)).collect());
            }
        }
    }

    if !current.columns.is_empty() {
        last = current;
    }
    Ok(last)
}

fn decode_value(row: &SqliteRow, i: usize) -> BindValue {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return BindValue::Null,
        Err(_) => return BindValue::Null,
        _ => {}
    }

    if let Ok(v) = row.try_get::<i64, _>(i) {
        BindValue::Int(v)
    } else if let Ok(v) = row.try_get::<f64, _>(i) {
        BindValue::Float(v)
    } else if let Ok(v) = row.try_get::<String, _>(i) {
        BindValue::Text(v)
    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        BindValue::Bytes(v)
    } else if let Ok(v) = row.try_get_unchecked::<String, _>(i) {
        BindValue::Text(v)
    } else {
        BindValue::Null
    }
}

// --- Batch Writes ---

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &BindValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.clone()),
        BindValue::Bytes(v) => query.bind(v.clone()),
    }
}

pub async fn execute_batch(pool: &Pool<Sqlite>, sql: &str, rows: &[Vec<BindValue>]) -> BridgeResult<u64> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    let mut affected = 0;

    for row in rows {
        let query = row.iter().fold(sqlx::query(sql), bind_value);
        affected += query
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
    }

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(affected)
}

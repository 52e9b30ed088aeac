// =====================================================
// POSTGRESQL POOL BACKEND
// =====================================================

use crate::config::PoolSettings;
use crate::db_types::{BindValue, ConnectionCredentials, RecordBatch};
use crate::dialect::Endpoint;
use crate::error::{classify_sqlx_connect_error, map_sqlx_error, BridgeError, BridgeResult};
use futures::StreamExt;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Either, Pool, Postgres, Row, ValueRef};

// --- Connection ---

pub(crate) fn connect_options(endpoint: &Endpoint, credentials: &ConnectionCredentials) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&endpoint.host)
        .port(endpoint.port)
        .username(&credentials.user_name)
        .password(&credentials.password)
        .database(&endpoint.database)
        .log_statements(log::LevelFilter::Debug)
}

pub async fn create_pool(
    endpoint: &Endpoint,
    credentials: &ConnectionCredentials,
    settings: &PoolSettings,
) -> BridgeResult<Pool<Postgres>> {
    PgPoolOptions::new()
        .max_connections(settings.max_size)
        .min_connections(settings.min_idle)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect_with(connect_options(endpoint, credentials))
        .await
        .map_err(|e| {
            log::warn!(
                "PostgreSQL pool for {}:{} failed to connect: {}",
                endpoint.host,
                endpoint.port,
                e
            );
            BridgeError::connect(classify_sqlx_connect_error(&e), e.to_string())
        })
}

// --- Query Execution ---

/// Runs `sql` over the simple-query protocol and returns the last result set
/// that carried columns.
pub async fn fetch_records(pool: &Pool<Postgres>, sql: &str) -> BridgeResult<RecordBatch> {
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
                current.rows.push(decode_row(&row));
            }
        }
    }

    if !current.columns.is_empty() {
        last = current;
    }
    Ok(last)
}

fn decode_row(row: &PgRow) -> Vec<BindValue> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &PgRow, i: usize) -> BindValue {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return BindValue::Null,
        Err(_) => return BindValue::Null,
        _ => {}
    }

    row.try_get::<i64, _>(i)
        .map(BindValue::Int)
        .or_else(|_| row.try_get::<i32, _>(i).map(|v| BindValue::Int(v.into())))
        .or_else(|_| row.try_get::<i16, _>(i).map(|v| BindValue::Int(v.into())))
        .or_else(|_| row.try_get::<f64, _>(i).map(BindValue::Float))
        .or_else(|_| row.try_get::<f32, _>(i).map(|v| BindValue::Float(v.into())))
        .or_else(|_| row.try_get::<bool, _>(i).map(BindValue::Bool))
        .or_else(|_| row.try_get::<String, _>(i).map(BindValue::Text))
        .or_else(|_| row.try_get::<Vec<u8>, _>(i).map(BindValue::Bytes))
        // numeric, temporal and other types arrive as text
        .or_else(|_| row.try_get_unchecked::<String, _>(i).map(BindValue::Text))
        .unwrap_or(BindValue::Null)
}

// --- Batch Writes ---

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &BindValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.clone()),
        BindValue::Bytes(v) => query.bind(v.clone()),
    }
}

/// Executes `sql` once per row inside one transaction. Any failure rolls the
/// whole batch back.
pub async fn execute_batch(pool: &Pool<Postgres>, sql: &str, rows: &[Vec<BindValue>]) -> BridgeResult<u64> {
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

#[cfg(test)]
mod tests;

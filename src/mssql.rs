// =====================================================
// MSSQL POOL BACKEND (via Tiberius)
// =====================================================

use crate::config::PoolSettings;
use crate::db_types::{BindValue, ConnectionCredentials, RecordBatch};
use crate::dialect::Endpoint;
use crate::error::{BridgeError, BridgeResult, ConnectFailure};
use deadpool_tiberius::{Manager, Pool};
use futures::{AsyncRead, AsyncWrite, TryStreamExt};
use std::time::Duration;
use tiberius::{AuthMethod, Client, Query, QueryItem, Row};

// --- Connection ---

/// Builds the pool without dialing; the first checkout opens a socket.
pub fn create_pool(
    endpoint: &Endpoint,
    credentials: &ConnectionCredentials,
    settings: &PoolSettings,
) -> BridgeResult<Pool> {
    let mut manager = Manager::new()
        .host(&endpoint.host)
        .port(endpoint.port)
        .authentication(AuthMethod::sql_server(
            &credentials.user_name,
            &credentials.password,
        ))
        .database(&endpoint.database)
        .trust_cert()
        .max_size(settings.max_size as usize);

    if let Some(instance) = endpoint.instance.as_deref() {
        manager = manager.instance_name(instance);
    }

    manager
        .create_pool()
        .map_err(|e| BridgeError::connect(ConnectFailure::Configuration, e.to_string()))
}

pub(crate) fn classify_connect_error(message: &str) -> ConnectFailure {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("login failed") || lowered.contains("password") {
        ConnectFailure::Authentication
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        ConnectFailure::Timeout
    } else {
        ConnectFailure::Unreachable
    }
}

// Checkout is bounded by the acquire timeout instead of waiting on the pool.
fn checked_out<T, E: std::fmt::Display>(
    outcome: Result<Result<T, E>, tokio::time::error::Elapsed>,
    acquire_timeout: Duration,
) -> BridgeResult<T> {
    match outcome {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => {
            let message = e.to_string();
            Err(BridgeError::connect(classify_connect_error(&message), message))
        }
        Err(_) => Err(BridgeError::connect(
            ConnectFailure::Timeout,
            format!("no connection within {} seconds", acquire_timeout.as_secs()),
        )),
    }
}

fn query_error(e: tiberius::error::Error) -> BridgeError {
    BridgeError::Query(e.to_string())
}

// --- Query Execution ---

pub async fn fetch_records(pool: &Pool, acquire_timeout: Duration, sql: &str) -> BridgeResult<RecordBatch> {
    let mut conn = checked_out(tokio::time::timeout(acquire_timeout, pool.get()).await, acquire_timeout)?;
    let mut stream = conn.query(sql, &[]).await.map_err(query_error)?;

    let mut last = RecordBatch::default();
    let mut current = RecordBatch::default();

    while let Some(item) = stream.try_next().await.map_err(query_error)? {
        match item {
            QueryItem::Metadata(meta) => {
                if !current.columns.is_empty() {
                    last = std::mem::take(&mut current);
                }
                current.columns = meta.columns().iter().map(|c| c.name().to_string()).collect();
            }
            QueryItem::Row(row) => {
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

fn decode_row(row: &Row) -> Vec<BindValue> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &Row, i: usize) -> BindValue {
    if let Ok(Some(v)) = row.try_get::<i64, _>(i) {
        BindValue::Int(v)
    } else if let Ok(Some(v)) = row.try_get::<i32, _>(i) {
        BindValue::Int(v.into())
    } else if let Ok(Some(v)) = row.try_get::<i16, _>(i) {
        BindValue::Int(v.into())
    } else if let Ok(Some(v)) = row.try_get::<u8, _>(i) {
        BindValue::Int(v.into())
    } else if let Ok(Some(v)) = row.try_get::<f64, _>(i) {
        BindValue::Float(v)
    } else if let Ok(Some(v)) = row.try_get::<f32, _>(i) {
        BindValue::Float(v.into())
    } else if let Ok(Some(v)) = row.try_get::<bool, _>(i) {
        BindValue::Bool(v)
    } else if let Ok(Some(v)) = row.try_get::<tiberius::numeric::Numeric, _>(i) {
        BindValue::Text(v.to_string())
    } else if let Ok(Some(v)) = row.try_get::<&str, _>(i) {
        BindValue::Text(v.to_string())
    } else if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        BindValue::Text(v.to_string())
    } else if let Ok(Some(v)) = row.try_get::<chrono::NaiveDate, _>(i) {
        BindValue::Text(v.to_string())
    } else if let Ok(Some(v)) = row.try_get::<chrono::DateTime<chrono::FixedOffset>, _>(i) {
        BindValue::Text(v.to_rfc3339())
    } else if let Ok(Some(v)) = row.try_get::<tiberius::Uuid, _>(i) {
        BindValue::Text(v.to_string())
    } else if let Ok(Some(v)) = row.try_get::<&[u8], _>(i) {
        BindValue::Bytes(v.to_vec())
    } else {
        BindValue::Null
    }
}

// --- Batch Writes ---

fn bind_value(query: &mut Query<'_>, value: &BindValue) {
    match value {
        BindValue::Null => query.bind(Option::<String>::None),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.clone()),
        BindValue::Bytes(v) => query.bind(v.clone()),
    }
}

async fn run_simple<S>(conn: &mut Client<S>, sql: &str) -> BridgeResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    conn.simple_query(sql)
        .await
        .map_err(query_error)?
        .into_results()
        .await
        .map_err(query_error)?;
    Ok(())
}

async fn insert_rows<S>(conn: &mut Client<S>, sql: &str, rows: &[Vec<BindValue>]) -> BridgeResult<u64>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut affected = 0;
    for row in rows {
        let mut query = Query::new(sql);
        for value in row {
            bind_value(&mut query, value);
        }
        affected += query.execute(&mut *conn).await.map_err(query_error)?.total();
    }
    Ok(affected)
}

/// Executes `sql` once per row inside one explicit transaction.
pub async fn execute_batch(
    pool: &Pool,
    acquire_timeout: Duration,
    sql: &str,
    rows: &[Vec<BindValue>],
) -> BridgeResult<u64> {
    let mut conn = checked_out(tokio::time::timeout(acquire_timeout, pool.get()).await, acquire_timeout)?;
    let client = &mut *conn;
    run_simple(&mut *client, "BEGIN TRANSACTION").await?;

    match insert_rows(&mut *client, sql, rows).await {
        Ok(affected) => {
            run_simple(&mut *client, "COMMIT TRANSACTION").await?;
            Ok(affected)
        }
        Err(e) => {
            if let Err(rollback_err) = run_simple(&mut *client, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await {
                log::warn!("MSSQL rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

// =====================================================
// ORACLE POOL BACKEND (ODPI-C via the `oracle` crate)
// Built only with the `oracle` cargo feature
// =====================================================

use crate::config::PoolSettings;
use crate::db_types::{BindValue, ConnectionCredentials, RecordBatch};
use crate::dialect::Endpoint;
use crate::error::{BridgeError, BridgeResult, ConnectFailure};
use oracle::pool::{CloseMode, GetMode, Pool, PoolBuilder};
use oracle::sql_type::{OracleType, ToSql};
use oracle::SqlValue;
use std::sync::Arc;

// --- Connection ---

/// SID endpoints use a full descriptor; service names use EZConnect.
pub(crate) fn connect_string(endpoint: &Endpoint) -> String {
    match endpoint.sid.as_deref() {
        Some(sid) => format!(
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SID={})))",
            endpoint.host, endpoint.port, sid
        ),
        None => format!("//{}:{}/{}", endpoint.host, endpoint.port, endpoint.database),
    }
}

pub(crate) fn classify_connect_error(message: &str) -> ConnectFailure {
    if message.contains("ORA-01017") || message.contains("ORA-28000") {
        ConnectFailure::Authentication
    } else if message.contains("ORA-12170") || message.contains("DPI-1067") {
        ConnectFailure::Timeout
    } else {
        ConnectFailure::Unreachable
    }
}

fn connect_error(e: oracle::Error) -> BridgeError {
    let message = e.to_string();
    BridgeError::connect(classify_connect_error(&message), message)
}

fn query_error(e: oracle::Error) -> BridgeError {
    BridgeError::Query(e.to_string())
}

// ODPI-C calls block the thread.
async fn blocking<T, F>(work: F) -> BridgeResult<T>
where
    F: FnOnce() -> BridgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BridgeError::Query(format!("Oracle worker failed: {}", e)))?
}

pub async fn create_pool(
    endpoint: &Endpoint,
    credentials: &ConnectionCredentials,
    settings: &PoolSettings,
) -> BridgeResult<Arc<Pool>> {
    let connect = connect_string(endpoint);
    let user = credentials.user_name.clone();
    let password = credentials.password.clone();
    let settings = settings.clone();

    blocking(move || {
        PoolBuilder::new(user, password, connect)
            .max_connections(settings.max_size)
            .min_connections(settings.min_idle)
            .get_mode(GetMode::TimedWait(settings.acquire_timeout()))
            .build()
            .map(Arc::new)
            .map_err(connect_error)
    })
    .await
}

pub async fn close(pool: Arc<Pool>) {
    let outcome = blocking(move || pool.close(&CloseMode::Default).map_err(query_error)).await;
    if let Err(e) = outcome {
        log::warn!("Oracle pool did not close cleanly: {}", e);
    }
}

// --- Query Execution ---

pub async fn fetch_records(pool: Arc<Pool>, sql: String) -> BridgeResult<RecordBatch> {
    blocking(move || {
        let conn = pool.get().map_err(connect_error)?;
        let rows = conn.query(&sql, &[]).map_err(query_error)?;

        let mut batch = RecordBatch {
            columns: rows.column_info().iter().map(|c| c.name().to_string()).collect(),
            rows: Vec::new(),
        };
        for row in rows {
            let row = row.map_err(query_error)?;
            batch.rows.push(row.sql_values().iter().map(decode_value).collect());
        }
        Ok(batch)
    })
    .await
}

fn decode_value(value: &SqlValue) -> BindValue {
    if value.is_null().unwrap_or(true) {
        return BindValue::Null;
    }

    match value.oracle_type() {
        Ok(OracleType::Number(..))
        | Ok(OracleType::Float(_))
        | Ok(OracleType::BinaryFloat)
        | Ok(OracleType::BinaryDouble) => match value.get::<String>() {
            Ok(text) => text
                .parse::<i64>()
                .map(BindValue::Int)
                .or_else(|_| text.parse::<f64>().map(BindValue::Float))
                .unwrap_or(BindValue::Text(text)),
            Err(_) => BindValue::Null,
        },
        Ok(OracleType::Raw(_)) | Ok(OracleType::LongRaw) | Ok(OracleType::BLOB) => value
            .get::<Vec<u8>>()
            .map(BindValue::Bytes)
            .unwrap_or(BindValue::Null),
        _ => value.get::<String>().map(BindValue::Text).unwrap_or(BindValue::Null),
    }
}

// --- Batch Writes ---

fn to_param(value: &BindValue) -> Box<dyn ToSql> {
    match value {
        BindValue::Null => Box::new(None::<String>),
        // no BOOLEAN column type before 23ai
        BindValue::Bool(v) => Box::new(i64::from(*v)),
        BindValue::Int(v) => Box::new(*v),
        BindValue::Float(v) => Box::new(*v),
        BindValue::Text(v) => Box::new(v.clone()),
        BindValue::Bytes(v) => Box::new(v.clone()),
    }
}

pub async fn execute_batch(pool: Arc<Pool>, sql: String, rows: Vec<Vec<BindValue>>) -> BridgeResult<u64> {
    blocking(move || {
        let conn = pool.get().map_err(connect_error)?;

        for row in &rows {
            let params = row.iter().map(to_param).collect::<Vec<_>>();
            let refs = params.iter().map(|p| p.as_ref()).collect::<Vec<&dyn ToSql>>();
            if let Err(e) = conn.execute(&sql, &refs) {
                if let Err(rollback_err) = conn.rollback() {
                    log::warn!("Oracle rollback failed: {}", rollback_err);
                }
                return Err(query_error(e));
            }
        }

        conn.commit().map_err(query_error)?;
        Ok(rows.len() as u64)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(sid: Option<&str>) -> Endpoint {
        Endpoint {
            host: "ora".into(),
            port: 1521,
            database: "sales".into(),
            sid: sid.map(str::to_string),
            instance: None,
        }
    }

    #[test]
    fn test_connect_string_forms() {
        assert_eq!(
            connect_string(&endpoint(Some("ORCL"))),
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=ora)(PORT=1521))(CONNECT_DATA=(SID=ORCL)))"
        );
        assert_eq!(connect_string(&endpoint(None)), "//ora:1521/sales");
    }

    #[test]
    fn test_classify_connect_error() {
        assert_eq!(
            classify_connect_error("ORA-01017: invalid username/password; logon denied"),
            ConnectFailure::Authentication
        );
        assert_eq!(
            classify_connect_error("ORA-12541: TNS:no listener"),
            ConnectFailure::Unreachable
        );
    }
}

// =====================================================
// COMMON DATABASE TYPES AND STRUCTURES
// =====================================================

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// One row keyed by column name, in select-list order.
pub type Row = serde_json::Map<String, Value>;

// --- Database Type Enum ---
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SqlServer,
    Oracle,
    SQLite,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 5] = [
        DatabaseType::PostgreSQL,
        DatabaseType::MySQL,
        DatabaseType::SqlServer,
        DatabaseType::Oracle,
        DatabaseType::SQLite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::SqlServer => "sqlserver",
            DatabaseType::Oracle => "oracle",
            DatabaseType::SQLite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        DatabaseType::ALL
            .into_iter()
            .find(|db_type| db_type.as_str() == normalized)
            .ok_or_else(|| BridgeError::UnsupportedDialect(value.trim().to_string()))
    }
}

// --- Connection Credentials ---
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCredentials {
    #[serde(default)]
    pub connection_id: String,
    pub database_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    // Oracle SID or service name
    pub sid: Option<String>,
    // SQL Server named instance
    pub instance: Option<String>,
    #[serde(rename = "jdbcUrl")]
    pub url: Option<String>,
}

impl ConnectionCredentials {
    pub fn normalized_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn normalized_sid(&self) -> Option<&str> {
        self.sid.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn normalized_instance(&self) -> Option<&str> {
        self.instance.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    /// Copy safe to hand back to callers or write to logs.
    pub fn redacted(&self) -> Self {
        Self {
            password: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("connection_id", &self.connection_id)
            .field("database_type", &self.database_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("sid", &self.sid)
            .field("instance", &self.instance)
            .field("url", &self.url)
            .finish()
    }
}

// --- Query Result ---
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect::<Row>()
            })
            .collect()
    }
}

// --- Record Batch ---
/// Result set with typed cells, as read for transfers. Browsing goes through
/// [`RecordBatch::into_query_result`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<BindValue>>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn into_query_result(self) -> QueryResult {
        QueryResult {
            columns: self.columns,
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(BindValue::to_json).collect())
                .collect(),
        }
    }
}

// --- Bind Value ---
/// Scalar read from a source row or bound to an INSERT placeholder.
/// Engine types without a closer match (decimals, temporals, uuids) travel
/// as text.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl BindValue {
    /// JSON rendering for browsing. Bytes become `0x` hex text and
    /// non-finite floats become null.
    pub fn to_json(&self) -> Value {
        match self {
            BindValue::Null => Value::Null,
            BindValue::Bool(v) => Value::Bool(*v),
            BindValue::Int(v) => json!(v),
            BindValue::Float(v) => json!(v),
            BindValue::Text(v) => Value::String(v.clone()),
            BindValue::Bytes(v) => Value::String(format!("0x{}", hex::encode(v))),
        }
    }
}

impl From<u64> for BindValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(BindValue::Int)
            .unwrap_or_else(|_| BindValue::Text(value.to_string()))
    }
}

// --- Column Descriptor ---
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub ordinal_position: u32,
    #[serde(default)]
    pub is_primary_key: bool,
}

// --- Table Page ---
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub total_row_count: u64,
    pub page_number: u64,
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_parsing() {
        assert_eq!("PostgreSQL".parse::<DatabaseType>().unwrap(), DatabaseType::PostgreSQL);
        assert_eq!(" sqlserver ".parse::<DatabaseType>().unwrap(), DatabaseType::SqlServer);
        assert!(matches!(
            "db2".parse::<DatabaseType>(),
            Err(BridgeError::UnsupportedDialect(tag)) if tag == "db2"
        ));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = ConnectionCredentials {
            database_type: "postgresql".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("hunter2"));
        assert!(credentials.redacted().password.is_empty());
    }

    #[test]
    fn test_credentials_accept_jdbc_url_field() {
        let credentials: ConnectionCredentials = serde_json::from_value(json!({
            "connectionId": "c1",
            "databaseType": "mysql",
            "jdbcUrl": "jdbc:mysql://db:3306/app",
            "userName": "root",
            "password": "pw"
        }))
        .unwrap();
        assert_eq!(credentials.normalized_url(), Some("jdbc:mysql://db:3306/app"));
        assert_eq!(credentials.port, 0);
    }

    #[test]
    fn test_bind_value_json_rendering() {
        assert_eq!(BindValue::Null.to_json(), Value::Null);
        assert_eq!(BindValue::Int(7).to_json(), json!(7));
        assert_eq!(BindValue::Float(1.5).to_json(), json!(1.5));
        assert_eq!(BindValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(BindValue::Bool(true).to_json(), json!(true));
        assert_eq!(BindValue::Text("x".into()).to_json(), json!("x"));
        assert_eq!(BindValue::Bytes(vec![0xca, 0xfe]).to_json(), json!("0xcafe"));
        assert_eq!(BindValue::from(u64::MAX), BindValue::Text(u64::MAX.to_string()));
        assert_eq!(BindValue::from(9u64), BindValue::Int(9));
    }

    #[test]
    fn test_record_batch_keeps_bytes_until_rendered() {
        let batch = RecordBatch {
            columns: vec!["id".into(), "data".into()],
            rows: vec![vec![BindValue::Int(1), BindValue::Bytes(b"hi".to_vec())]],
        };
        assert_eq!(batch.rows[0][1], BindValue::Bytes(vec![0x68, 0x69]));

        let rendered = batch.into_query_result();
        assert_eq!(rendered.columns, vec!["id", "data"]);
        assert_eq!(rendered.rows, vec![vec![json!(1), json!("0x6869")]]);
    }

    #[test]
    fn test_query_result_into_rows_keeps_column_order() {
        let result = QueryResult {
            columns: vec!["b".into(), "a".into()],
            rows: vec![vec![json!(1), json!("x")]],
        };
        let rows = result.into_rows();
        let keys = rows[0].keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(rows[0]["a"], json!("x"));
    }
}

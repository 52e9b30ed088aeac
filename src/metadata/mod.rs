// =====================================================
// SCHEMA DISCOVERY
// Tables, column metadata, paged rows and ad-hoc queries on a live handle
// =====================================================

use crate::config::EngineConfig;
use crate::connections::PooledConnectionHandle;
use crate::db_types::{ColumnDescriptor, Row, TablePage};
use crate::dialect::{self, build_count_query, build_paging_query};
use crate::error::{BridgeError, BridgeResult};
use crate::validator::{ensure_freeform_query, ensure_identifier};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct SchemaDiscoveryService {
    default_page_size: usize,
    max_page_size: usize,
}

impl Default for SchemaDiscoveryService {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SchemaDiscoveryService {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Base tables of the connected schema, in catalog order.
    pub async fn list_tables(&self, handle: &PooledConnectionHandle) -> BridgeResult<Vec<String>> {
        let sql = dialect::dialect(handle.database_type()).list_tables_query;
        let result = handle.fetch(sql).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(value_as_string))
            .collect())
    }

    pub async fn list_columns(
        &self,
        handle: &PooledConnectionHandle,
        table_name: &str,
    ) -> BridgeResult<Vec<ColumnDescriptor>> {
        ensure_identifier(table_name)?;
        let sql = dialect::dialect(handle.database_type()).list_columns_query(table_name);
        let result = handle.fetch(&sql).await?;

        let mut columns = result
            .rows
            .iter()
            .filter_map(|row| parse_column_row(row))
            .collect::<Vec<_>>();
        if columns.is_empty() {
            return Err(BridgeError::UnknownTable(table_name.to_string()));
        }
        columns.sort_by_key(|column| column.ordinal_position);
        Ok(columns)
    }

    pub async fn count_rows(&self, handle: &PooledConnectionHandle, table_name: &str) -> BridgeResult<u64> {
        let sql = build_count_query(handle.database_type(), table_name)?;
        let result = handle.fetch(&sql).await?;
        result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(value_as_u64)
            .ok_or_else(|| BridgeError::Query(format!("COUNT(*) on '{}' returned no value", table_name)))
    }

    /// Zero-based page of `table_name`. A page past the end is empty but
    /// still carries the current row count.
    pub async fn get_page(
        &self,
        handle: &PooledConnectionHandle,
        table_name: &str,
        page_number: u64,
        page_size: Option<usize>,
    ) -> BridgeResult<TablePage> {
        ensure_identifier(table_name)?;
        let page_size = page_size.unwrap_or(self.default_page_size);
        if page_size == 0 || page_size > self.max_page_size {
            return Err(BridgeError::InvalidPageRequest(format!(
                "page size must be between 1 and {}",
                self.max_page_size
            )));
        }

        let columns = self.list_columns(handle, table_name).await?;
        let total_row_count = self.count_rows(handle, table_name).await?;
        let page_query = build_paging_query(
            handle.database_type(),
            table_name,
            page_number,
            page_size,
            &order_columns(&columns),
        )?;

        let rows = if page_query.offset >= total_row_count {
            Vec::new()
        } else {
            handle.fetch(&page_query.sql).await?.into_rows()
        };

        log::debug!(
            "Page {} of '{}' returned {} rows (total {})",
            page_number,
            table_name,
            rows.len(),
            total_row_count
        );

        Ok(TablePage {
            table_name: table_name.to_string(),
            columns,
            rows,
            total_row_count,
            page_number,
            page_size,
        })
    }

    /// Runs a whitelisted ad-hoc query. Rejected text never reaches the pool.
    pub async fn execute_query(&self, handle: &PooledConnectionHandle, query: &str) -> BridgeResult<Vec<Row>> {
        ensure_freeform_query(query)?;
        Ok(handle.fetch(query).await?.into_rows())
    }
}

/// Stable sort key for paging: primary-key columns, else every orderable
/// column in ordinal order so ties on the first column still sort the same
/// way on each page.
pub fn order_columns(columns: &[ColumnDescriptor]) -> Vec<String> {
    let mut by_position = columns.iter().collect::<Vec<_>>();
    by_position.sort_by_key(|column| column.ordinal_position);

    let keys = by_position
        .iter()
        .filter(|column| column.is_primary_key)
        .collect::<Vec<_>>();
    if !keys.is_empty() {
        return keys.into_iter().map(|column| column.name.clone()).collect();
    }

    by_position
        .iter()
        .enumerate()
        .filter(|(idx, column)| *idx == 0 || is_orderable(&column.declared_type))
        .map(|(_, column)| column.name.clone())
        .collect()
}

// Large-object and document types some engines refuse to sort on.
fn is_orderable(declared_type: &str) -> bool {
    !matches!(
        declared_type.trim().to_ascii_lowercase().as_str(),
        "blob" | "clob" | "nclob" | "bfile" | "long" | "long raw" | "ntext" | "image" | "xml" | "json"
            | "sql_variant" | "geometry" | "geography"
    )
}

// --- Catalog Value Parsing ---
// Catalog columns come back as text on some engines and numbers on others.

fn parse_column_row(row: &[Value]) -> Option<ColumnDescriptor> {
    let name = row.first().and_then(value_as_string)?;
    Some(ColumnDescriptor {
        name,
        declared_type: row.get(1).and_then(value_as_string).unwrap_or_default(),
        nullable: row.get(2).map(value_as_flag).unwrap_or(true),
        ordinal_position: row
            .get(3)
            .and_then(value_as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        is_primary_key: row.get(4).map(value_as_flag).unwrap_or(false),
    })
}

pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_uppercase().as_str(),
            "YES" | "Y" | "TRUE" | "T" | "1"
        ),
        _ => false,
    }
}

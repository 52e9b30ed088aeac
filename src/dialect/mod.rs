// =====================================================
// DIALECT REGISTRY
// Driver descriptors, URL templates and SQL generation per engine
// =====================================================

use crate::db_types::{ColumnDescriptor, ConnectionCredentials, DatabaseType};
use crate::error::{BridgeError, BridgeResult, ConnectFailure};
use crate::validator::{ensure_identifier, validate_identifier};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverDescriptor {
    pub database_type: DatabaseType,
    pub driver_name: &'static str,
    pub default_port: u16,
}

/// Where to connect, taken either from discrete credential fields or from a
/// parsed URL override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub sid: Option<String>,
    pub instance: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub sql: String,
    pub offset: u64,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialField {
    Host,
    Port,
    DatabaseName,
    UserName,
    Password,
}

impl CredentialField {
    fn label(&self) -> &'static str {
        match self {
            CredentialField::Host => "host",
            CredentialField::Port => "port",
            CredentialField::DatabaseName => "databaseName",
            CredentialField::UserName => "userName",
            CredentialField::Password => "password",
        }
    }

    fn is_present(&self, credentials: &ConnectionCredentials) -> bool {
        match self {
            CredentialField::Host => !credentials.host.trim().is_empty(),
            CredentialField::Port => credentials.port > 0,
            CredentialField::DatabaseName => !credentials.database_name.trim().is_empty(),
            CredentialField::UserName => !credentials.user_name.trim().is_empty(),
            CredentialField::Password => !credentials.password.is_empty(),
        }
    }
}

const NETWORK_FIELDS: &[CredentialField] = &[
    CredentialField::Host,
    CredentialField::Port,
    CredentialField::DatabaseName,
    CredentialField::UserName,
    CredentialField::Password,
];

const ORACLE_FIELDS: &[CredentialField] = &[
    CredentialField::Host,
    CredentialField::Port,
    CredentialField::UserName,
    CredentialField::Password,
];

const URL_OVERRIDE_FIELDS: &[CredentialField] = &[CredentialField::UserName, CredentialField::Password];

const FILE_FIELDS: &[CredentialField] = &[CredentialField::DatabaseName];

/// Everything that differs between engines. One entry per [`DatabaseType`].
pub struct Dialect {
    pub driver: DriverDescriptor,
    pub probe_query: &'static str,
    pub list_tables_query: &'static str,
    required_fields: &'static [CredentialField],
    url_override_fields: &'static [CredentialField],
    url_template: fn(&Endpoint) -> BridgeResult<String>,
    url_parser: fn(&str) -> Option<Endpoint>,
    quote: fn(&str) -> String,
    paging: fn(&str, &[String], u64, usize) -> String,
    placeholder: fn(usize, &ColumnDescriptor) -> String,
    list_columns: fn(&str) -> String,
}

impl Dialect {
    pub fn quote_identifier(&self, name: &str) -> String {
        (self.quote)(name)
    }

    pub fn list_columns_query(&self, table: &str) -> String {
        (self.list_columns)(table)
    }
}

// --- Registry ---

static POSTGRES: Dialect = Dialect {
    driver: DriverDescriptor {
        database_type: DatabaseType::PostgreSQL,
        driver_name: "sqlx-postgres",
        default_port: 5432,
    },
    probe_query: "SELECT 1",
    list_tables_query: "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'",
    required_fields: NETWORK_FIELDS,
    url_override_fields: URL_OVERRIDE_FIELDS,
    url_template: postgres_url,
    url_parser: postgres_parse_url,
    quote: quote_identifier_postgres,
    paging: limit_offset_paging,
    placeholder: postgres_placeholder,
    list_columns: postgres_list_columns,
};

static MYSQL: Dialect = Dialect {
    driver: DriverDescriptor {
        database_type: DatabaseType::MySQL,
        driver_name: "sqlx-mysql",
        default_port: 3306,
    },
    probe_query: "SELECT 1",
    list_tables_query: "SELECT TABLE_NAME FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
    required_fields: NETWORK_FIELDS,
    url_override_fields: URL_OVERRIDE_FIELDS,
    url_template: mysql_url,
    url_parser: mysql_parse_url,
    quote: quote_identifier_mysql,
    paging: limit_offset_paging,
    placeholder: question_mark_placeholder,
    list_columns: mysql_list_columns,
};

static SQL_SERVER: Dialect = Dialect {
    driver: DriverDescriptor {
        database_type: DatabaseType::SqlServer,
        driver_name: "tiberius",
        default_port: 1433,
    },
    probe_query: "SELECT 1",
    list_tables_query: "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_TYPE = 'BASE TABLE'",
    required_fields: NETWORK_FIELDS,
    url_override_fields: URL_OVERRIDE_FIELDS,
    url_template: sqlserver_url,
    url_parser: sqlserver_parse_url,
    quote: quote_identifier_mssql,
    paging: offset_fetch_paging,
    placeholder: mssql_placeholder,
    list_columns: mssql_list_columns,
};

static ORACLE: Dialect = Dialect {
    driver: DriverDescriptor {
        database_type: DatabaseType::Oracle,
        driver_name: "oracle-odpi",
        default_port: 1521,
    },
    probe_query: "SELECT 1 FROM DUAL",
    list_tables_query: "SELECT table_name FROM user_tables",
    required_fields: ORACLE_FIELDS,
    url_override_fields: URL_OVERRIDE_FIELDS,
    url_template: oracle_url,
    url_parser: oracle_parse_url,
    quote: bare_identifier,
    paging: offset_fetch_paging,
    placeholder: oracle_placeholder,
    list_columns: oracle_list_columns,
};

static SQLITE: Dialect = Dialect {
    driver: DriverDescriptor {
        database_type: DatabaseType::SQLite,
        driver_name: "sqlx-sqlite",
        default_port: 0,
    },
    probe_query: "SELECT 1",
    list_tables_query: "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    required_fields: FILE_FIELDS,
    url_override_fields: &[],
    url_template: sqlite_url,
    url_parser: sqlite_parse_url,
    quote: quote_identifier_postgres,
    paging: limit_offset_paging,
    placeholder: question_mark_placeholder,
    list_columns: sqlite_list_columns,
};

pub fn dialect(db_type: DatabaseType) -> &'static Dialect {
    match db_type {
        DatabaseType::PostgreSQL => &POSTGRES,
        DatabaseType::MySQL => &MYSQL,
        DatabaseType::SqlServer => &SQL_SERVER,
        DatabaseType::Oracle => &ORACLE,
        DatabaseType::SQLite => &SQLITE,
    }
}

// --- Public Contract ---

pub fn resolve_driver(database_type: &str) -> BridgeResult<&'static DriverDescriptor> {
    let db_type = database_type.parse::<DatabaseType>()?;
    Ok(&dialect(db_type).driver)
}

/// Checks required fields and works out where to connect.
///
/// Nothing here touches the network, so a malformed credential set always
/// fails before any connection attempt.
pub fn resolve_endpoint(credentials: &ConnectionCredentials) -> BridgeResult<(DatabaseType, Endpoint)> {
    if credentials.database_type.trim().is_empty() {
        return Err(BridgeError::MissingRequiredCredentialField("databaseType"));
    }
    let db_type = credentials.database_type.parse::<DatabaseType>()?;
    let entry = dialect(db_type);

    if let Some(url) = credentials.normalized_url() {
        ensure_fields(credentials, entry.url_override_fields)?;
        let mut endpoint = (entry.url_parser)(url).ok_or_else(|| {
            BridgeError::connect(
                ConnectFailure::Configuration,
                format!("URL does not match the {} template", db_type),
            )
        })?;
        if endpoint.port == 0 {
            endpoint.port = entry.driver.default_port;
        }
        return Ok((db_type, endpoint));
    }

    ensure_fields(credentials, entry.required_fields)?;
    let endpoint = Endpoint {
        host: credentials.host.trim().to_string(),
        port: credentials.port,
        database: credentials.database_name.trim().to_string(),
        sid: credentials.normalized_sid().map(str::to_string),
        instance: credentials.normalized_instance().map(str::to_string),
    };
    if db_type == DatabaseType::Oracle && endpoint.sid.is_none() {
        return Err(BridgeError::MissingOracleIdentifier);
    }
    Ok((db_type, endpoint))
}

/// JDBC-style URL for the credentials. A caller-supplied URL is returned as is.
pub fn build_connection_url(credentials: &ConnectionCredentials) -> BridgeResult<String> {
    let (db_type, endpoint) = resolve_endpoint(credentials)?;
    if let Some(url) = credentials.normalized_url() {
        return Ok(url.to_string());
    }
    (dialect(db_type).url_template)(&endpoint)
}

pub fn build_paging_query(
    db_type: DatabaseType,
    table: &str,
    page_number: u64,
    page_size: usize,
    order_by: &[String],
) -> BridgeResult<QuerySpec> {
    ensure_identifier(table)?;
    for column in order_by {
        ensure_identifier(column)?;
    }
    if page_size == 0 {
        return Err(BridgeError::InvalidPageRequest("page size must be at least 1".to_string()));
    }
    let offset = page_number
        .checked_mul(page_size as u64)
        .ok_or_else(|| BridgeError::InvalidPageRequest("page offset overflows".to_string()))?;

    let entry = dialect(db_type);
    let table_ref = entry.quote_identifier(table);
    let order_refs = order_by
        .iter()
        .map(|column| entry.quote_identifier(column))
        .collect::<Vec<_>>();

    Ok(QuerySpec {
        sql: (entry.paging)(&table_ref, &order_refs, offset, page_size),
        offset,
        limit: page_size,
    })
}

pub fn build_count_query(db_type: DatabaseType, table: &str) -> BridgeResult<String> {
    ensure_identifier(table)?;
    Ok(format!(
        "SELECT COUNT(*) FROM {}",
        dialect(db_type).quote_identifier(table)
    ))
}

/// Parameterized single-row INSERT listing `columns` in the given order.
pub fn build_insert_query(
    db_type: DatabaseType,
    table: &str,
    columns: &[ColumnDescriptor],
) -> BridgeResult<String> {
    ensure_identifier(table)?;
    if columns.is_empty() {
        return Err(BridgeError::UnknownTable(table.to_string()));
    }
    for column in columns {
        ensure_identifier(&column.name)?;
    }

    let entry = dialect(db_type);
    let col_list = columns
        .iter()
        .map(|column| entry.quote_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let val_list = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| (entry.placeholder)(idx + 1, column))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entry.quote_identifier(table),
        col_list,
        val_list
    ))
}

fn ensure_fields(credentials: &ConnectionCredentials, fields: &[CredentialField]) -> BridgeResult<()> {
    match fields.iter().find(|field| !field.is_present(credentials)) {
        Some(field) => Err(BridgeError::MissingRequiredCredentialField(field.label())),
        None => Ok(()),
    }
}

// --- Identifier Quoting ---

pub fn quote_identifier_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn quote_identifier_postgres(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_identifier_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

// Oracle folds unquoted names to upper case; validated names need no quoting.
fn bare_identifier(name: &str) -> String {
    name.to_string()
}

// --- URL Templates ---

fn postgres_url(endpoint: &Endpoint) -> BridgeResult<String> {
    Ok(format!(
        "jdbc:postgresql://{}:{}/{}",
        endpoint.host, endpoint.port, endpoint.database
    ))
}

fn mysql_url(endpoint: &Endpoint) -> BridgeResult<String> {
    Ok(format!(
        "jdbc:mysql://{}:{}/{}",
        endpoint.host, endpoint.port, endpoint.database
    ))
}

fn sqlserver_url(endpoint: &Endpoint) -> BridgeResult<String> {
    let mut url = format!(
        "jdbc:sqlserver://{}:{};databaseName={}",
        endpoint.host, endpoint.port, endpoint.database
    );
    if let Some(instance) = endpoint.instance.as_deref() {
        url.push_str(";instanceName=");
        url.push_str(instance);
    }
    Ok(url)
}

fn oracle_url(endpoint: &Endpoint) -> BridgeResult<String> {
    let sid = endpoint
        .sid
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(BridgeError::MissingOracleIdentifier)?;
    Ok(format!("jdbc:oracle:thin:@{}:{}:{}", endpoint.host, endpoint.port, sid))
}

fn sqlite_url(endpoint: &Endpoint) -> BridgeResult<String> {
    Ok(format!("jdbc:sqlite:{}", endpoint.database))
}

// --- URL Parsers ---

fn parse_authority_url(url: &str, scheme: &str) -> Option<Endpoint> {
    let rest = url.strip_prefix("jdbc:").unwrap_or(url);
    let parsed = url::Url::parse(rest).ok()?;
    if parsed.scheme() != scheme {
        return None;
    }
    let host = parsed.host_str()?.to_string();
    let database = parsed.path().trim_start_matches('/').to_string();
    if database.is_empty() {
        return None;
    }
    Some(Endpoint {
        host,
        port: parsed.port().unwrap_or(0),
        database,
        sid: None,
        instance: None,
    })
}

fn postgres_parse_url(url: &str) -> Option<Endpoint> {
    parse_authority_url(url, "postgresql")
}

fn mysql_parse_url(url: &str) -> Option<Endpoint> {
    parse_authority_url(url, "mysql")
}

fn split_host_port(value: &str) -> Option<(String, u16)> {
    match value.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), port.parse().ok()?)),
        None => Some((value.to_string(), 0)),
    }
}

fn sqlserver_parse_url(url: &str) -> Option<Endpoint> {
    let rest = url.strip_prefix("jdbc:sqlserver://")?;
    let mut parts = rest.split(';');
    let (mut host, port) = split_host_port(parts.next()?)?;
    let mut instance = None;
    if let Some((server, named)) = host.split_once('\\') {
        instance = Some(named.to_string());
        host = server.to_string();
    }

    let mut database = String::new();
    for property in parts {
        let Some((key, value)) = property.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "databasename" | "database" => database = value.trim().to_string(),
            "instancename" => instance = Some(value.trim().to_string()),
            _ => {}
        }
    }

    if host.is_empty() || database.is_empty() {
        return None;
    }
    Some(Endpoint {
        host,
        port,
        database,
        sid: None,
        instance,
    })
}

fn oracle_parse_url(url: &str) -> Option<Endpoint> {
    let rest = url.strip_prefix("jdbc:oracle:thin:@")?;

    // Service name form: //host:port/service
    if let Some(service_form) = rest.strip_prefix("//") {
        let (address, service) = service_form.split_once('/')?;
        let (host, port) = split_host_port(address)?;
        if host.is_empty() || service.is_empty() {
            return None;
        }
        return Some(Endpoint {
            host,
            port,
            database: service.to_string(),
            sid: None,
            instance: None,
        });
    }

    let mut parts = rest.splitn(3, ':');
    let host = parts.next()?.to_string();
    let port = parts.next()?.parse().ok()?;
    let sid = parts.next()?.to_string();
    if host.is_empty() || sid.is_empty() {
        return None;
    }
    Some(Endpoint {
        host,
        port,
        database: String::new(),
        sid: Some(sid),
        instance: None,
    })
}

fn sqlite_parse_url(url: &str) -> Option<Endpoint> {
    let path = url.strip_prefix("jdbc:sqlite:")?;
    if path.is_empty() {
        return None;
    }
    Some(Endpoint {
        host: String::new(),
        port: 0,
        database: path.to_string(),
        sid: None,
        instance: None,
    })
}

// --- Paging ---

fn limit_offset_paging(table_ref: &str, order_refs: &[String], offset: u64, limit: usize) -> String {
    let mut sql = format!("SELECT * FROM {}", table_ref);
    if !order_refs.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_refs.join(", "));
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    sql
}

// SQL Server 2012+ and Oracle 12c+. SQL Server requires an ORDER BY.
fn offset_fetch_paging(table_ref: &str, order_refs: &[String], offset: u64, limit: usize) -> String {
    let order_by = if order_refs.is_empty() {
        "(SELECT NULL)".to_string()
    } else {
        order_refs.join(", ")
    };
    format!(
        "SELECT * FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        table_ref, order_by, offset, limit
    )
}

// --- Placeholders ---

fn postgres_placeholder(position: usize, column: &ColumnDescriptor) -> String {
    // Values arrive as text or JSON scalars; the cast lets the server convert
    // them to the column type.
    if validate_identifier(&column.declared_type) {
        format!("${}::{}", position, column.declared_type)
    } else {
        format!("${}", position)
    }
}

fn question_mark_placeholder(_position: usize, _column: &ColumnDescriptor) -> String {
    "?".to_string()
}

fn mssql_placeholder(position: usize, column: &ColumnDescriptor) -> String {
    // An untyped NULL is sent as nvarchar, which does not convert implicitly
    // to the binary types.
    match column.declared_type.trim().to_ascii_lowercase().as_str() {
        "binary" | "varbinary" | "image" => format!("CAST(@P{} AS VARBINARY(MAX))", position),
        _ => format!("@P{}", position),
    }
}

fn oracle_placeholder(position: usize, _column: &ColumnDescriptor) -> String {
    format!(":{}", position)
}

// --- Catalog Queries ---
// Callers validate `table` before it is embedded.

fn postgres_list_columns(table: &str) -> String {
    format!(
        r#"
        SELECT
            c.column_name,
            c.udt_name,
            c.is_nullable,
            c.ordinal_position,
            CASE WHEN EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                    AND tc.table_name = kcu.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = c.table_schema
                    AND tc.table_name = c.table_name
                    AND kcu.column_name = c.column_name
            ) THEN 1 ELSE 0 END AS is_primary_key
        FROM information_schema.columns c
        WHERE c.table_schema = current_schema()
            AND c.table_name = '{}'
        ORDER BY c.ordinal_position
        "#,
        table
    )
}

fn mysql_list_columns(table: &str) -> String {
    format!(
        r#"
        SELECT
            COLUMN_NAME,
            COLUMN_TYPE,
            IS_NULLABLE,
            ORDINAL_POSITION,
            CASE WHEN COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS is_primary_key
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_NAME = '{}'
        ORDER BY ORDINAL_POSITION
        "#,
        table
    )
}

fn mssql_list_columns(table: &str) -> String {
    format!(
        r#"
        SELECT
            c.COLUMN_NAME,
            c.DATA_TYPE,
            c.IS_NULLABLE,
            c.ORDINAL_POSITION,
            CASE WHEN pk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS is_primary_key
        FROM INFORMATION_SCHEMA.COLUMNS c
        LEFT JOIN (
            SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        ) pk ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
            AND pk.TABLE_NAME = c.TABLE_NAME
            AND pk.COLUMN_NAME = c.COLUMN_NAME
        WHERE c.TABLE_SCHEMA = SCHEMA_NAME()
            AND c.TABLE_NAME = '{}'
        ORDER BY c.ORDINAL_POSITION
        "#,
        table
    )
}

fn oracle_list_columns(table: &str) -> String {
    format!(
        r#"
        SELECT
            c.column_name,
            c.data_type,
            c.nullable,
            c.column_id,
            CASE WHEN EXISTS (
                SELECT 1
                FROM user_constraints uc
                JOIN user_cons_columns ucc ON uc.constraint_name = ucc.constraint_name
                WHERE uc.constraint_type = 'P'
                    AND uc.table_name = c.table_name
                    AND ucc.column_name = c.column_name
            ) THEN 1 ELSE 0 END AS is_primary_key
        FROM user_tab_columns c
        WHERE c.table_name = UPPER('{}')
        ORDER BY c.column_id
        "#,
        table
    )
}

fn sqlite_list_columns(table: &str) -> String {
    format!(
        r#"
        SELECT
            name,
            type,
            CASE WHEN "notnull" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable,
            cid + 1 AS ordinal_position,
            CASE WHEN pk > 0 THEN 1 ELSE 0 END AS is_primary_key
        FROM pragma_table_info('{}')
        ORDER BY cid
        "#,
        table
    )
}

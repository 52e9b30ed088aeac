use super::*;
use crate::config::PoolSettings;
use crate::connections::{ConnectionPoolManager, OwnerConnectionRegistry};
use crate::data_transfer::models::TransferJobStatus;
use crate::store::{ConnectionRecord, CredentialStore, InMemoryCredentialStore};
use crate::test_support::{numbered_table_script, open_sqlite, seed_sqlite, sqlite_credentials};
use serde_json::{json, Value};
use tempfile::TempDir;

fn engine(chunk_size: usize) -> TransferEngine {
    TransferEngine::new(&EngineConfig {
        transfer_chunk_size: chunk_size,
        ..EngineConfig::default()
    })
}

fn column(name: &str, ordinal: u32) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.into(),
        declared_type: "TEXT".into(),
        nullable: true,
        ordinal_position: ordinal,
        is_primary_key: false,
    }
}

fn request(source: &str, destination: &str, table: &str) -> TransferRequest {
    TransferRequest {
        owner_id: "alice".into(),
        source_connection_id: source.into(),
        destination_connection_id: destination.into(),
        table_name: table.into(),
    }
}

async fn ids(handle: &PooledConnectionHandle, table: &str) -> Vec<i64> {
    handle
        .fetch(&format!("SELECT id FROM {} ORDER BY id", table))
        .await
        .unwrap()
        .rows
        .iter()
        .map(|row| row[0].as_i64().unwrap())
        .collect()
}

struct Fixture {
    _dir: TempDir,
    resolver: ConnectionResolver,
    jobs: Arc<TransferJobStore>,
    source: PooledConnectionHandle,
    destination: PooledConnectionHandle,
}

async fn fixture(source_rows: u32, destination_script: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    seed_sqlite(&dir, "src.db", &numbered_table_script("items", source_rows)).await;
    seed_sqlite(&dir, "dst.db", destination_script).await;

    let source = open_sqlite(&dir, "src", "src.db").await;
    let destination = open_sqlite(&dir, "dst", "dst.db").await;
    let registry = Arc::new(OwnerConnectionRegistry::new());
    registry.register("alice", source.clone()).await.unwrap();
    registry.register("alice", destination.clone()).await.unwrap();

    let resolver = ConnectionResolver::new(
        ConnectionPoolManager::new(PoolSettings::default()),
        registry,
        Arc::new(InMemoryCredentialStore::new()),
    );
    Fixture {
        _dir: dir,
        resolver,
        jobs: Arc::new(TransferJobStore::new()),
        source,
        destination,
    }
}

const EMPTY_ITEMS: &str = "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);";

#[test]
fn test_columns_map_by_name_ignoring_case() {
    let destination = vec![column("NAME", 1), column("extra", 2), column("Id", 3)];
    let source = vec![column("id", 1), column("name", 2)];
    let mapping = map_columns("items", &destination, &source);
    assert_eq!(
        mapping,
        vec![Some("name".to_string()), None, Some("id".to_string())]
    );

    let fetched = vec!["ID".to_string(), "name".to_string()];
    let positions = source_positions(&fetched, &mapping);
    assert_eq!(positions, vec![Some(1), None, Some(0)]);

    let row = vec![BindValue::Int(7), BindValue::Text("seven".into())];
    assert_eq!(
        bind_row(&row, &positions),
        vec![
            BindValue::Text("seven".into()),
            BindValue::Null,
            BindValue::Int(7)
        ]
    );
}

#[tokio::test]
async fn test_five_rows_in_chunks_of_two() {
    let fx = fixture(5, EMPTY_ITEMS).await;
    let totals = engine(2)
        .copy_table(&fx.source, &fx.destination, "items", &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(totals, TransferTotals { rows: 5, chunks: 3 });
    assert_eq!(ids(&fx.destination, "items").await, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_exact_multiple_of_chunk_size() {
    let fx = fixture(4, EMPTY_ITEMS).await;
    let totals = engine(2)
        .copy_table(&fx.source, &fx.destination, "items", &CancellationToken::new(), None)
        .await
        .unwrap();

    // the third page comes back empty and is not counted
    assert_eq!(totals, TransferTotals { rows: 4, chunks: 2 });
    assert_eq!(ids(&fx.destination, "items").await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_destination_column_order_and_missing_columns() {
    let fx = fixture(
        3,
        "CREATE TABLE items (NAME TEXT, extra TEXT, ID INTEGER PRIMARY KEY);",
    )
    .await;
    engine(10)
        .copy_table(&fx.source, &fx.destination, "items", &CancellationToken::new(), None)
        .await
        .unwrap();

    let result = fx
        .destination
        .fetch("SELECT ID, NAME, extra FROM items ORDER BY ID")
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows[1], vec![json!(2), json!("row2"), Value::Null]);
}

#[tokio::test]
async fn test_failed_chunk_keeps_earlier_chunks_only() {
    let fx = fixture(
        5,
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, CHECK (id <> 4));",
    )
    .await;
    let (job, cancel) = fx
        .jobs
        .create(&request("src", "dst", "items"), 2)
        .await;

    run_job(
        engine(2),
        fx.resolver.clone(),
        fx.jobs.clone(),
        job.job_id.clone(),
        request("src", "dst", "items"),
        cancel,
    )
    .await;

    let job = fx.jobs.get(&job.job_id).await.unwrap();
    assert_eq!(job.status, TransferJobStatus::Failed);
    assert_eq!(job.rows_transferred, 2);
    assert_eq!(job.chunks_committed, 1);
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, "chunk_transfer_failed");
    assert_eq!(failure.chunk_index, Some(1));
    assert!(job.finished_at.is_some());

    // row 3 was in the failed chunk and must have been rolled back
    assert_eq!(ids(&fx.destination, "items").await, vec![1, 2]);
    // registry handles survive the job
    assert!(!fx.source.is_closed());
    assert!(!fx.destination.is_closed());
}

#[tokio::test]
async fn test_successful_job_reports_rows_and_chunks() {
    let fx = fixture(5, EMPTY_ITEMS).await;
    let (job, cancel) = fx.jobs.create(&request("src", "dst", "items"), 2).await;
    assert_eq!(job.status, TransferJobStatus::Pending);

    run_job(
        engine(2),
        fx.resolver.clone(),
        fx.jobs.clone(),
        job.job_id.clone(),
        request("src", "dst", "items"),
        cancel,
    )
    .await;

    let job = fx.jobs.get(&job.job_id).await.unwrap();
    assert_eq!(job.status, TransferJobStatus::Succeeded);
    assert_eq!(job.rows_transferred, 5);
    assert_eq!(job.chunks_committed, 3);
    assert!(job.started_at.is_some());
    assert!(job.failure.is_none());
}

#[tokio::test]
async fn test_cancelled_job_is_failed_with_cancelled() {
    let fx = fixture(5, EMPTY_ITEMS).await;
    let (job, cancel) = fx.jobs.create(&request("src", "dst", "items"), 2).await;
    let snapshot = fx.jobs.cancel(&job.job_id).await.unwrap();
    assert!(snapshot.cancel_requested);

    run_job(
        engine(2),
        fx.resolver.clone(),
        fx.jobs.clone(),
        job.job_id.clone(),
        request("src", "dst", "items"),
        cancel,
    )
    .await;

    let job = fx.jobs.get(&job.job_id).await.unwrap();
    assert_eq!(job.status, TransferJobStatus::Failed);
    assert!(job.was_cancelled());
    assert_eq!(job.rows_transferred, 0);
    assert!(ids(&fx.destination, "items").await.is_empty());

    // cancelling a finished job changes nothing
    let again = fx.jobs.cancel(&job.job_id).await.unwrap();
    assert_eq!(again.status, TransferJobStatus::Failed);
}

#[tokio::test]
async fn test_unresolvable_connection_fails_job() {
    let fx = fixture(2, EMPTY_ITEMS).await;
    let (job, cancel) = fx.jobs.create(&request("src", "nowhere", "items"), 2).await;

    run_job(
        engine(2),
        fx.resolver.clone(),
        fx.jobs.clone(),
        job.job_id.clone(),
        request("src", "nowhere", "items"),
        cancel,
    )
    .await;

    let job = fx.jobs.get(&job.job_id).await.unwrap();
    assert_eq!(job.status, TransferJobStatus::Failed);
    assert_eq!(job.failure.unwrap().kind, "connection_unavailable");
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn test_invalid_or_unknown_table() {
    let fx = fixture(2, EMPTY_ITEMS).await;
    let token = CancellationToken::new();

    assert!(matches!(
        engine(2)
            .copy_table(&fx.source, &fx.destination, "items; DROP", &token, None)
            .await,
        Err(BridgeError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        engine(2)
            .copy_table(&fx.source, &fx.destination, "missing", &token, None)
            .await,
        Err(BridgeError::UnknownTable(_))
    ));
}

#[tokio::test]
async fn test_leases_from_stored_credentials_are_closed_on_release() {
    let dir = TempDir::new().unwrap();
    seed_sqlite(&dir, "src.db", &numbered_table_script("items", 1)).await;
    let store = Arc::new(InMemoryCredentialStore::new());
    store
        .save(ConnectionRecord::new("alice", sqlite_credentials(&dir, "src", "src.db")))
        .await
        .unwrap();
    let registry = Arc::new(OwnerConnectionRegistry::new());
    let resolver = ConnectionResolver::new(
        ConnectionPoolManager::new(PoolSettings::default()),
        registry.clone(),
        store,
    );

    let lease = resolver.lease("alice", "src").await.unwrap();
    assert!(lease.is_ephemeral());
    let handle = lease.handle().clone();
    lease.release().await;
    assert!(handle.is_closed());
    assert!(registry.is_empty().await);

    // registered handles are shared, not closed
    let registered = resolver.registered("alice", "src").await.unwrap();
    let lease = resolver.lease("alice", "src").await.unwrap();
    assert!(!lease.is_ephemeral());
    lease.release().await;
    assert!(!registered.is_closed());

    assert!(matches!(
        resolver.lease("bob", "src").await,
        Err(BridgeError::ConnectionUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_typed_columns_copy_unchanged() {
    const SAMPLES: &str = "CREATE TABLE samples (id INTEGER PRIMARY KEY, ratio REAL, flag BOOLEAN, payload BLOB, note TEXT);";
    let dir = TempDir::new().unwrap();
    seed_sqlite(
        &dir,
        "src.db",
        &format!(
            "{} INSERT INTO samples VALUES (1, 0.25, 1, x'6869', 'first'); \
             INSERT INTO samples VALUES (2, -3.5, 0, x'00FF10', NULL); \
             INSERT INTO samples VALUES (3, NULL, NULL, NULL, 'third');",
            SAMPLES
        ),
    )
    .await;
    seed_sqlite(&dir, "dst.db", SAMPLES).await;
    let source = open_sqlite(&dir, "src", "src.db").await;
    let destination = open_sqlite(&dir, "dst", "dst.db").await;

    let totals = engine(2)
        .copy_table(&source, &destination, "samples", &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(totals, TransferTotals { rows: 3, chunks: 2 });

    let inspect = "SELECT id, typeof(ratio) AS rt, ratio, typeof(flag) AS ft, flag, \
                   typeof(payload) AS pt, hex(payload) AS ph, note FROM samples ORDER BY id";
    let copied = destination.fetch(inspect).await.unwrap();
    assert_eq!(copied, source.fetch(inspect).await.unwrap());
    assert_eq!(
        copied.rows[0],
        vec![
            json!(1),
            json!("real"),
            json!(0.25),
            json!("integer"),
            json!(1),
            json!("blob"),
            json!("6869"),
            json!("first")
        ]
    );
    assert_eq!(copied.rows[1][6], json!("00FF10"));
    assert_eq!(copied.rows[2][5], json!("null"));
    assert_eq!(copied.rows[2][2], Value::Null);
}

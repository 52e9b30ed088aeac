use super::*;
use crate::test_support::sqlite_credentials;
use serde_json::json;
use tempfile::TempDir;

fn fast_manager() -> ConnectionPoolManager {
    ConnectionPoolManager::new(PoolSettings {
        acquire_timeout_secs: 1,
        ..PoolSettings::default()
    })
}

#[tokio::test]
async fn test_missing_fields_fail_before_connecting() {
    let manager = fast_manager();

    let credentials = ConnectionCredentials {
        connection_id: "pg".into(),
        database_type: "postgresql".into(),
        port: 5432,
        database_name: "app".into(),
        user_name: "etl".into(),
        password: "pw".into(),
        ..Default::default()
    };
    assert!(matches!(
        manager.create_and_test(&credentials).await,
        Err(BridgeError::MissingRequiredCredentialField("host"))
    ));

    let credentials = ConnectionCredentials {
        database_type: "oracle".into(),
        host: "ora".into(),
        port: 1521,
        user_name: "scott".into(),
        password: "tiger".into(),
        ..Default::default()
    };
    assert!(matches!(
        manager.create_and_test(&credentials).await,
        Err(BridgeError::MissingOracleIdentifier)
    ));

    let credentials = ConnectionCredentials {
        database_type: "db2".into(),
        ..Default::default()
    };
    let err = manager.create_and_test(&credentials).await.unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedDialect(_)));
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn test_refused_connection_is_connection_test_failed() {
    let credentials = ConnectionCredentials {
        connection_id: "pg".into(),
        database_type: "postgresql".into(),
        host: "127.0.0.1".into(),
        port: 1,
        database_name: "app".into(),
        user_name: "etl".into(),
        password: "pw".into(),
        ..Default::default()
    };
    let err = fast_manager().create_and_test(&credentials).await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionTestFailed { .. }));
    assert!(err.is_connectivity_error());
}

#[cfg(not(feature = "oracle"))]
#[tokio::test]
async fn test_oracle_without_driver_is_reported() {
    let credentials = ConnectionCredentials {
        database_type: "oracle".into(),
        host: "ora".into(),
        port: 1521,
        user_name: "scott".into(),
        password: "tiger".into(),
        sid: Some("ORCL".into()),
        ..Default::default()
    };
    assert!(matches!(
        fast_manager().create_and_test(&credentials).await,
        Err(BridgeError::ConnectionTestFailed {
            failure: ConnectFailure::DriverUnavailable,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unopenable_sqlite_file_fails_the_test() {
    let dir = TempDir::new().unwrap();
    let credentials = ConnectionCredentials {
        connection_id: "broken".into(),
        database_type: "sqlite".into(),
        // a directory cannot be opened as a database file
        database_name: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    };
    let err = fast_manager().create_and_test(&credentials).await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionTestFailed { .. }));
}

#[tokio::test]
async fn test_sqlite_handle_probes_and_queries() {
    let dir = TempDir::new().unwrap();
    let handle = fast_manager()
        .create_and_test(&sqlite_credentials(&dir, "local", "app.db"))
        .await
        .unwrap();

    assert_eq!(handle.connection_id(), "local");
    assert_eq!(handle.database_type(), DatabaseType::SQLite);
    assert!(handle.url().starts_with("jdbc:sqlite:"));

    let result = handle.fetch("SELECT 1 AS one").await.unwrap();
    assert_eq!(result.columns, vec!["one"]);
    assert_eq!(result.rows, vec![vec![json!(1)]]);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let manager = fast_manager();
    let handle = manager
        .create_and_test(&sqlite_credentials(&dir, "local", "app.db"))
        .await
        .unwrap();

    assert!(handle.close().await);
    assert!(!handle.close().await);
    manager.close(&handle).await;
    assert!(handle.is_closed());

    assert!(matches!(
        handle.fetch("SELECT 1").await,
        Err(BridgeError::ConnectionUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_owners_do_not_see_each_others_connections() {
    let dir = TempDir::new().unwrap();
    let manager = fast_manager();
    let registry = OwnerConnectionRegistry::new();

    let alice = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "alice.db"))
        .await
        .unwrap();
    let bob = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "bob.db"))
        .await
        .unwrap();

    registry.register("alice", alice.clone()).await.unwrap();
    registry.register("bob", bob.clone()).await.unwrap();

    let found_alice = registry.get("alice", "main").await.unwrap();
    let found_bob = registry.get("bob", "main").await.unwrap();
    assert!(found_alice.same_pool(&alice));
    assert!(found_bob.same_pool(&bob));
    assert!(!found_alice.same_pool(&found_bob));
    assert!(!alice.is_closed());
    assert!(!bob.is_closed());
    assert!(registry.get("carol", "main").await.is_none());
    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn test_registering_same_id_replaces_and_closes_previous() {
    let dir = TempDir::new().unwrap();
    let manager = fast_manager();
    let registry = OwnerConnectionRegistry::new();

    let first = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "one.db"))
        .await
        .unwrap();
    let second = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "two.db"))
        .await
        .unwrap();

    registry.register("alice", first.clone()).await.unwrap();
    registry.register("alice", second.clone()).await.unwrap();

    assert!(first.is_closed());
    assert!(registry.get("alice", "main").await.unwrap().same_pool(&second));
    assert_eq!(registry.connection_ids("alice").await, vec!["main".to_string()]);
}

#[tokio::test]
async fn test_get_or_register_keeps_the_first_open_handle() {
    let dir = TempDir::new().unwrap();
    let manager = fast_manager();
    let registry = OwnerConnectionRegistry::new();

    let first = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "app.db"))
        .await
        .unwrap();
    let second = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "app.db"))
        .await
        .unwrap();

    let kept = registry.get_or_register("alice", first.clone()).await.unwrap();
    assert!(kept.same_pool(&first));
    let kept = registry.get_or_register("alice", second.clone()).await.unwrap();
    assert!(kept.same_pool(&first));
    assert!(second.is_closed());
    assert!(!first.is_closed());

    // a closed entry is taken over
    first.close().await;
    let third = manager
        .create_and_test(&sqlite_credentials(&dir, "main", "app.db"))
        .await
        .unwrap();
    let kept = registry.get_or_register("alice", third.clone()).await.unwrap();
    assert!(kept.same_pool(&third));
    assert!(registry.get("alice", "main").await.unwrap().same_pool(&third));
    assert!(registry.get_or_register("alice", second).await.is_err());
}

#[tokio::test]
async fn test_closed_handles_cannot_be_registered() {
    let dir = TempDir::new().unwrap();
    let registry = OwnerConnectionRegistry::new();
    let handle = fast_manager()
        .create_and_test(&sqlite_credentials(&dir, "main", "app.db"))
        .await
        .unwrap();
    handle.close().await;

    assert!(registry.register("alice", handle).await.is_err());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_registration_across_owners() {
    let dir = TempDir::new().unwrap();
    let manager = fast_manager();
    let registry = Arc::new(OwnerConnectionRegistry::new());

    let mut tasks = Vec::new();
    for owner in 0..8 {
        let handle = manager
            .create_and_test(&sqlite_credentials(&dir, "shared", &format!("owner{owner}.db")))
            .await
            .unwrap();
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.register(&format!("owner{owner}"), handle).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(registry.len().await, 8);
    let drained = registry.drain().await;
    assert_eq!(drained.len(), 8);
    assert!(registry.is_empty().await);
    for handle in drained {
        handle.close().await;
    }
}

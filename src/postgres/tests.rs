use super::*;
use crate::error::ConnectFailure;

fn endpoint(port: u16) -> Endpoint {
    Endpoint {
        host: "127.0.0.1".into(),
        port,
        database: "app".into(),
        sid: None,
        instance: None,
    }
}

fn credentials() -> ConnectionCredentials {
    ConnectionCredentials {
        database_type: "postgresql".into(),
        user_name: "etl".into(),
        password: "secret".into(),
        ..Default::default()
    }
}

#[test]
fn test_connect_options_follow_endpoint() {
    let options = connect_options(&endpoint(6543), &credentials());
    assert_eq!(options.get_host(), "127.0.0.1");
    assert_eq!(options.get_port(), 6543);
    assert_eq!(options.get_database(), Some("app"));
    assert_eq!(options.get_username(), "etl");
}

#[tokio::test]
async fn test_refused_connection_is_a_typed_failure() {
    let settings = PoolSettings {
        acquire_timeout_secs: 1,
        ..PoolSettings::default()
    };
    let err = create_pool(&endpoint(1), &credentials(), &settings)
        .await
        .expect_err("nothing listens on port 1");
    match err {
        BridgeError::ConnectionTestFailed { failure, .. } => {
            assert!(matches!(
                failure,
                ConnectFailure::Unreachable | ConnectFailure::Timeout
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// =====================================================
// CONNECTION METADATA STORE
// Credential records per (owner, connection id), used to rehydrate handles
// =====================================================

use crate::db_types::ConnectionCredentials;
use crate::error::BridgeResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub owner_id: String,
    pub credentials: ConnectionCredentials,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn new(owner_id: &str, credentials: ConnectionCredentials) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            credentials,
            updated_at: Utc::now(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.credentials.connection_id
    }
}

/// Key-value lookup of credential records. Implementations live with the host
/// application; the engine never relies on anything beyond these three calls.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts or replaces the record for its (owner, connection id).
    async fn save(&self, record: ConnectionRecord) -> BridgeResult<()>;

    async fn find_by_owner_and_connection_id(
        &self,
        owner_id: &str,
        connection_id: &str,
    ) -> BridgeResult<Option<ConnectionRecord>>;

    async fn find_all_by_owner(&self, owner_id: &str) -> BridgeResult<Vec<ConnectionRecord>>;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<(String, String), ConnectionRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save(&self, record: ConnectionRecord) -> BridgeResult<()> {
        let key = (record.owner_id.clone(), record.connection_id().to_string());
        self.records.write().await.insert(key, record);
        Ok(())
    }

    async fn find_by_owner_and_connection_id(
        &self,
        owner_id: &str,
        connection_id: &str,
    ) -> BridgeResult<Option<ConnectionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(owner_id.to_string(), connection_id.to_string()))
            .cloned())
    }

    /// Sorted by connection id.
    async fn find_all_by_owner(&self, owner_id: &str) -> BridgeResult<Vec<ConnectionRecord>> {
        let records = self.records.read().await;
        let mut out = records
            .values()
            .filter(|record| record.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.connection_id().cmp(b.connection_id()));
        Ok(out)
    }
}

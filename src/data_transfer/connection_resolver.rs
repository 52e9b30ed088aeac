use crate::connections::{ConnectionPoolManager, OwnerConnectionRegistry, PooledConnectionHandle};
use crate::error::{BridgeError, BridgeResult};
use crate::store::CredentialStore;
use std::sync::Arc;

/// A handle held for the length of one job. Handles built only for the job
/// are closed on release; registry handles are left open.
#[derive(Debug)]
pub struct TransferLease {
    handle: PooledConnectionHandle,
    ephemeral: bool,
}

impl TransferLease {
    pub fn handle(&self) -> &PooledConnectionHandle {
        &self.handle
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub async fn release(self) {
        if self.ephemeral {
            self.handle.close().await;
        }
    }
}

/// Finds handles by (owner, connection id): first in the registry, then by
/// rebuilding them from stored credentials.
#[derive(Clone)]
pub struct ConnectionResolver {
    manager: ConnectionPoolManager,
    registry: Arc<OwnerConnectionRegistry>,
    store: Arc<dyn CredentialStore>,
}

fn normalize_connection_id(value: &str) -> String {
    value.trim().to_string()
}

impl ConnectionResolver {
    pub fn new(
        manager: ConnectionPoolManager,
        registry: Arc<OwnerConnectionRegistry>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            manager,
            registry,
            store,
        }
    }

    pub fn manager(&self) -> &ConnectionPoolManager {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<OwnerConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    async fn rebuild(&self, owner_id: &str, connection_id: &str) -> BridgeResult<PooledConnectionHandle> {
        let record = self
            .store
            .find_by_owner_and_connection_id(owner_id, connection_id)
            .await?
            .ok_or_else(|| BridgeError::unavailable(connection_id, "no stored credentials for this owner"))?;

        log::info!(
            "Rehydrating connection '{}' for owner '{}'",
            connection_id,
            owner_id
        );
        self.manager
            .create_and_test(&record.credentials)
            .await
            .map_err(|e| match e {
                BridgeError::ConnectionTestFailed { failure, message } => {
                    BridgeError::unavailable(connection_id, format!("{}: {}", failure, message))
                }
                other => other,
            })
    }

    /// Registry handle, rehydrated and registered when it was evicted.
    pub async fn registered(&self, owner_id: &str, connection_id: &str) -> BridgeResult<PooledConnectionHandle> {
        let connection_id = normalize_connection_id(connection_id);
        if connection_id.is_empty() {
            return Err(BridgeError::MissingRequiredCredentialField("connectionId"));
        }
        if let Some(handle) = self.registry.get(owner_id, &connection_id).await {
            if !handle.is_closed() {
                return Ok(handle);
            }
        }

        let handle = self.rebuild(owner_id, &connection_id).await?;
        self.registry.get_or_register(owner_id, handle).await
    }

    /// Handle for a transfer job. A registry miss builds a private handle
    /// that is closed when the lease is released.
    pub async fn lease(&self, owner_id: &str, connection_id: &str) -> BridgeResult<TransferLease> {
        let connection_id = normalize_connection_id(connection_id);
        if let Some(handle) = self.registry.get(owner_id, &connection_id).await {
            if !handle.is_closed() {
                return Ok(TransferLease {
                    handle,
                    ephemeral: false,
                });
            }
        }

        let handle = self
            .rebuild(owner_id, &connection_id)
            .await
            .map_err(|e| match e {
                BridgeError::Store(message) => BridgeError::unavailable(&connection_id, message),
                other => other,
            })?;
        Ok(TransferLease {
            handle,
            ephemeral: true,
        })
    }
}

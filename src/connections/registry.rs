use super::PooledConnectionHandle;
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type OwnerSlot = Arc<RwLock<HashMap<String, PooledConnectionHandle>>>;

/// owner id -> connection id -> handle.
///
/// The outer lock is only held to find or create an owner's slot, so work on
/// one owner never waits behind another owner's writes.
#[derive(Default)]
pub struct OwnerConnectionRegistry {
    owners: RwLock<HashMap<String, OwnerSlot>>,
}

impl OwnerConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, owner_id: &str) -> Option<OwnerSlot> {
        self.owners.read().await.get(owner_id).cloned()
    }

    async fn slot_or_create(&self, owner_id: &str) -> OwnerSlot {
        if let Some(slot) = self.slot(owner_id).await {
            return slot;
        }
        let mut owners = self.owners.write().await;
        owners.entry(owner_id.to_string()).or_default().clone()
    }

    /// Stores `handle` under its connection id. A previous handle under the
    /// same key is closed once it has been swapped out.
    pub async fn register(&self, owner_id: &str, handle: PooledConnectionHandle) -> BridgeResult<()> {
        if handle.is_closed() {
            return Err(BridgeError::unavailable(handle.connection_id(), "handle is closed"));
        }

        let slot = self.slot_or_create(owner_id).await;
        let replaced = slot
            .write()
            .await
            .insert(handle.connection_id().to_string(), handle.clone());

        if let Some(previous) = replaced {
            if !previous.same_pool(&handle) {
                log::info!(
                    "Replacing connection '{}' for owner '{}'",
                    handle.connection_id(),
                    owner_id
                );
                previous.close().await;
            }
        }
        Ok(())
    }

    /// Stores `handle` unless an open handle is already registered under its
    /// connection id. The losing handle is closed and the registered one is
    /// returned, so concurrent rehydrations settle on a single pool.
    pub async fn get_or_register(
        &self,
        owner_id: &str,
        handle: PooledConnectionHandle,
    ) -> BridgeResult<PooledConnectionHandle> {
        if handle.is_closed() {
            return Err(BridgeError::unavailable(handle.connection_id(), "handle is closed"));
        }

        let slot = self.slot_or_create(owner_id).await;
        let existing = {
            let mut handles = slot.write().await;
            match handles.get(handle.connection_id()) {
                Some(current) if !current.is_closed() => Some(current.clone()),
                _ => {
                    handles.insert(handle.connection_id().to_string(), handle.clone());
                    None
                }
            }
        };

        match existing {
            Some(current) => {
                if !current.same_pool(&handle) {
                    log::debug!(
                        "Connection '{}' for owner '{}' was registered concurrently; dropping duplicate",
                        handle.connection_id(),
                        owner_id
                    );
                    handle.close().await;
                }
                Ok(current)
            }
            None => Ok(handle),
        }
    }

    pub async fn get(&self, owner_id: &str, connection_id: &str) -> Option<PooledConnectionHandle> {
        let slot = self.slot(owner_id).await?;
        let handles = slot.read().await;
        handles.get(connection_id).cloned()
    }

    /// Removes the entry without closing it.
    pub async fn remove(&self, owner_id: &str, connection_id: &str) -> Option<PooledConnectionHandle> {
        let slot = self.slot(owner_id).await?;
        let mut handles = slot.write().await;
        handles.remove(connection_id)
    }

    pub async fn connection_ids(&self, owner_id: &str) -> Vec<String> {
        match self.slot(owner_id).await {
            Some(slot) => {
                let mut ids = slot.read().await.keys().cloned().collect::<Vec<_>>();
                ids.sort();
                ids
            }
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        let slots = self.owners.read().await.values().cloned().collect::<Vec<_>>();
        let mut total = 0;
        for slot in slots {
            total += slot.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Empties the registry and hands back every handle it held.
    pub async fn drain(&self) -> Vec<PooledConnectionHandle> {
        let slots = std::mem::take(&mut *self.owners.write().await);
        let mut drained = Vec::new();
        for slot in slots.into_values() {
            drained.extend(slot.write().await.drain().map(|(_, handle)| handle));
        }
        drained
    }
}

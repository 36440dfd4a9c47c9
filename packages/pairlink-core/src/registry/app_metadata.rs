//! Requester metadata, keyed by sender id.

use crate::error::Result;
use crate::message::AppMetadata;
use crate::storage::{StorageKey, TypedStore};

/// Persistent requester metadata collection
#[derive(Debug, Clone)]
pub struct AppMetadataStore {
    store: TypedStore,
}

impl AppMetadataStore {
    /// Create a store over `store`
    pub fn new(store: TypedStore) -> Self {
        Self { store }
    }

    /// All metadata records
    pub async fn list(&self) -> Result<Vec<AppMetadata>> {
        self.store.get(StorageKey::AppMetadata).await
    }

    /// Metadata for a requester
    pub async fn get(&self, sender_id: &str) -> Result<Option<AppMetadata>> {
        Ok(self.list().await?.into_iter().find(|m| m.sender_id == sender_id))
    }

    /// Insert, or replace the record for the same sender id
    pub async fn add(&self, metadata: AppMetadata) -> Result<Vec<AppMetadata>> {
        let mut records = self.list().await?;
        match records.iter_mut().find(|m| m.sender_id == metadata.sender_id) {
            Some(existing) => *existing = metadata,
            None => records.push(metadata),
        }
        self.store.set(StorageKey::AppMetadata, &records).await?;
        Ok(records)
    }

    /// Remove the record for a requester
    pub async fn remove(&self, sender_id: &str) -> Result<Vec<AppMetadata>> {
        let mut records = self.list().await?;
        records.retain(|m| m.sender_id != sender_id);
        self.store.set(StorageKey::AppMetadata, &records).await?;
        Ok(records)
    }

    /// Remove every record
    pub async fn remove_all(&self) -> Result<()> {
        self.store.delete(StorageKey::AppMetadata).await?;
        Ok(())
    }
}

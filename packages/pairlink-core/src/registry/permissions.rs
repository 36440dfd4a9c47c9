//! # Permission Store
//!
//! Granted permissions, one per (account, requester).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{AppMetadata, Network, Scope};
use crate::storage::{StorageKey, TypedStore};

/// A trust decision the user made for a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionInfo {
    /// Identifier derived from address + network
    pub account_identifier: String,
    /// Requester the permission was granted to
    pub sender_id: String,
    /// Requester metadata at grant time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<AppMetadata>,
    /// Website or peer the request arrived from
    pub origin_id: String,
    /// Account address
    pub address: String,
    /// Account public key
    pub pubkey: String,
    /// Network the grant is scoped to
    pub network: Network,
    /// Granted capabilities
    pub scopes: Vec<Scope>,
    /// When the grant was made (millis)
    pub connected_at: i64,
}

impl PermissionInfo {
    /// Whether this grant covers `scope`
    pub fn allows(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Persistent permission collection
#[derive(Debug, Clone)]
pub struct PermissionStore {
    store: TypedStore,
}

impl PermissionStore {
    /// Create a store over `store`
    pub fn new(store: TypedStore) -> Self {
        Self { store }
    }

    /// All permissions
    pub async fn list(&self) -> Result<Vec<PermissionInfo>> {
        self.store.get(StorageKey::Permissions).await
    }

    /// First permission for an account
    pub async fn get(&self, account_identifier: &str) -> Result<Option<PermissionInfo>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|p| p.account_identifier == account_identifier))
    }

    /// Every permission held by a requester
    pub async fn for_sender(&self, sender_id: &str) -> Result<Vec<PermissionInfo>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.sender_id == sender_id)
            .collect())
    }

    /// Insert, or replace the entry for the same account and requester
    pub async fn add(&self, permission: PermissionInfo) -> Result<Vec<PermissionInfo>> {
        let mut permissions = self.list().await?;

        match permissions.iter_mut().find(|p| {
            p.account_identifier == permission.account_identifier
                && p.sender_id == permission.sender_id
        }) {
            Some(existing) => *existing = permission,
            None => permissions.push(permission),
        }

        self.store.set(StorageKey::Permissions, &permissions).await?;
        Ok(permissions)
    }

    /// Remove every permission for an account
    pub async fn remove(&self, account_identifier: &str) -> Result<Vec<PermissionInfo>> {
        let mut permissions = self.list().await?;
        permissions.retain(|p| p.account_identifier != account_identifier);
        self.store.set(StorageKey::Permissions, &permissions).await?;
        Ok(permissions)
    }

    /// Remove every permission
    pub async fn remove_all(&self) -> Result<()> {
        self.store.delete(StorageKey::Permissions).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn store() -> PermissionStore {
        PermissionStore::new(TypedStore::new(Arc::new(MemoryStorage::new())))
    }

    fn permission(account: &str, sender: &str, scopes: Vec<Scope>) -> PermissionInfo {
        PermissionInfo {
            account_identifier: account.into(),
            sender_id: sender.into(),
            app_metadata: None,
            origin_id: "https://dapp.example".into(),
            address: "addr1".into(),
            pubkey: "pk1".into(),
            network: Network::mainnet(),
            scopes,
            connected_at: 1,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_scopes() {
        let store = store();
        store
            .add(permission("acct1", "dapp1", vec![Scope::ReadAddress]))
            .await
            .unwrap();
        store
            .add(permission("acct1", "dapp1", vec![Scope::ReadAddress, Scope::Sign]))
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].scopes, vec![Scope::ReadAddress, Scope::Sign]);
    }

    #[tokio::test]
    async fn test_distinct_requesters_coexist() {
        let store = store();
        store.add(permission("acct1", "dapp1", vec![Scope::Sign])).await.unwrap();
        store.add(permission("acct1", "dapp2", vec![Scope::Sign])).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        assert_eq!(store.for_sender("dapp2").await.unwrap().len(), 1);
        assert!(store.get("acct1").await.unwrap().is_some());

        let remaining = store.remove("acct1").await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_and_allows() {
        let store = store();
        let granted = permission("acct1", "dapp1", vec![Scope::OperationRequest]);
        assert!(granted.allows(Scope::OperationRequest));
        assert!(!granted.allows(Scope::Sign));

        store.add(granted).await.unwrap();
        store.remove_all().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}

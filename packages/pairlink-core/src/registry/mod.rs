//! # Registries
//!
//! Persistent trust state: wallets, granted permissions and requester
//! metadata. All three share one [`Storage`](crate::storage::Storage)
//! backend and are only mutated through their own operations.

mod app_metadata;
mod permissions;
mod wallets;

pub use app_metadata::AppMetadataStore;
pub use permissions::{PermissionInfo, PermissionStore};
pub use wallets::{LocalSecretInfo, WalletDetails, WalletInfo, WalletRegistry, WalletType};

use std::sync::Arc;

use crate::storage::{Storage, TypedStore};

/// The registries bundle handed to handlers
#[derive(Debug, Clone)]
pub struct Registries {
    /// Configured wallets and active pointers
    pub wallets: WalletRegistry,
    /// Granted permissions
    pub permissions: PermissionStore,
    /// Requester metadata
    pub app_metadata: AppMetadataStore,
}

impl Registries {
    /// Build every registry over one storage backend
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let store = TypedStore::new(storage);
        Self {
            wallets: WalletRegistry::new(store.clone()),
            permissions: PermissionStore::new(store.clone()),
            app_metadata: AppMetadataStore::new(store),
        }
    }
}

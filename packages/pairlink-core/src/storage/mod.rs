//! # Storage Module
//!
//! The key-value persistence contract every registry is built on.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   WalletRegistry   PermissionStore   AppMetadataStore   Transports     │
//! │         │                 │                 │                │          │
//! │         └─────────────────┴────────┬────────┴────────────────┘          │
//! │                                    ▼                                    │
//! │                     ┌──────────────────────────┐                        │
//! │                     │  TypedStore              │  typed get with        │
//! │                     │  (StorageKey defaults)   │  declared defaults     │
//! │                     └────────────┬─────────────┘                        │
//! │                                  ▼                                      │
//! │                     ┌──────────────────────────┐                        │
//! │                     │  dyn Storage             │  get / set / delete    │
//! │                     └────────────┬─────────────┘                        │
//! │                       ┌──────────┴──────────┐                           │
//! │                       ▼                     ▼                           │
//! │               MemoryStorage          SqliteStorage                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every collection is stored whole under one key. Registries read the
//! collection, change it, and write it back; concurrent writers race with
//! last-writer-wins.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Raw key-value persistence
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value; `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Keys the engine persists under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Configured wallets
    Wallets,
    /// Active wallet pointer
    ActiveWallet,
    /// Active network pointer
    ActiveNetwork,
    /// Granted permissions
    Permissions,
    /// Requester metadata
    AppMetadata,
    /// Peers on the requester transport
    RequesterPeers,
    /// Peers on the remote-wallet transport
    RemoteWalletPeers,
}

impl StorageKey {
    /// Storage key string
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Wallets => "wallets",
            StorageKey::ActiveWallet => "ACTIVE_WALLET",
            StorageKey::ActiveNetwork => "ACTIVE_NETWORK",
            StorageKey::Permissions => "permissions",
            StorageKey::AppMetadata => "app_metadata",
            StorageKey::RequesterPeers => "requester_peers",
            StorageKey::RemoteWalletPeers => "remote_wallet_peers",
        }
    }

    /// Value returned when the key is absent
    pub fn default_value(&self) -> Value {
        match self {
            StorageKey::Wallets
            | StorageKey::Permissions
            | StorageKey::AppMetadata
            | StorageKey::RequesterPeers
            | StorageKey::RemoteWalletPeers => json!([]),
            StorageKey::ActiveWallet => Value::Null,
            StorageKey::ActiveNetwork => json!({ "type": "mainnet" }),
        }
    }
}

/// Typed access to a [`Storage`] using the declared defaults
#[derive(Clone)]
pub struct TypedStore {
    inner: Arc<dyn Storage>,
}

impl TypedStore {
    /// Wrap a storage backend
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }

    /// Read and deserialize a key, falling back to its default
    pub async fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Result<T> {
        let value = self
            .inner
            .get(key.as_str())
            .await?
            .unwrap_or_else(|| key.default_value());

        serde_json::from_value(value).map_err(|e| {
            Error::StorageCorrupted(format!("{}: {}", key.as_str(), e))
        })
    }

    /// Serialize and write a key
    pub async fn set<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner.set(key.as_str(), value).await
    }

    /// Remove a key
    pub async fn delete(&self, key: StorageKey) -> Result<bool> {
        self.inner.delete(key.as_str()).await
    }
}

impl std::fmt::Debug for TypedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedStore").finish_non_exhaustive()
    }
}

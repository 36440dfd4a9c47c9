//! # Wallet Registry
//!
//! Configured wallets plus the active-wallet and active-network pointers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WALLET ADD RULES                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  add(w)                                                                 │
//! │   │                                                                     │
//! │   ├── pubkey already present ──► unchanged (idempotent)                 │
//! │   │                                                                     │
//! │   ├── w is LOCAL_SECRET ──► drop existing LOCAL_SECRET, append w        │
//! │   │                                                                     │
//! │   └── otherwise ──► append w                                            │
//! │                                                                         │
//! │  Every call reads the whole list and writes the whole list back.       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Network;
use crate::storage::{StorageKey, TypedStore};
use crate::transport::PeerDescriptor;

/// Kind of wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletType {
    /// Key material held by the extension itself
    LocalSecret,
    /// Signing delegated to a paired remote wallet
    RemotePairing,
}

/// Payload for a local-secret wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSecretInfo {
    /// Reference to where the secret is kept; never the secret itself
    pub secret_ref: String,
}

/// Type-specific wallet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WalletDetails {
    /// The paired remote wallet
    RemotePairing(PeerDescriptor),
    /// Local secret reference
    LocalSecret(LocalSecretInfo),
}

/// A configured wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    /// Wallet kind
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    /// Hex public key; the registry key
    pub pubkey: String,
    /// Account address
    pub address: String,
    /// When the wallet was added (millis)
    pub added: i64,
    /// Type-specific payload
    pub info: WalletDetails,
}

impl WalletInfo {
    /// A wallet whose secret the extension holds
    pub fn local_secret(
        pubkey: impl Into<String>,
        address: impl Into<String>,
        secret_ref: impl Into<String>,
    ) -> Self {
        Self {
            wallet_type: WalletType::LocalSecret,
            pubkey: pubkey.into(),
            address: address.into(),
            added: crate::time::now_timestamp_millis(),
            info: WalletDetails::LocalSecret(LocalSecretInfo {
                secret_ref: secret_ref.into(),
            }),
        }
    }

    /// A wallet that signs on a paired remote peer
    pub fn remote_pairing(peer: PeerDescriptor, address: impl Into<String>) -> Self {
        Self {
            wallet_type: WalletType::RemotePairing,
            pubkey: peer.public_key.clone(),
            address: address.into(),
            added: crate::time::now_timestamp_millis(),
            info: WalletDetails::RemotePairing(peer),
        }
    }

    /// Whether requests should be forwarded to a remote wallet
    pub fn is_remote(&self) -> bool {
        self.wallet_type == WalletType::RemotePairing
    }
}

/// Persistent wallet collection
#[derive(Debug, Clone)]
pub struct WalletRegistry {
    store: TypedStore,
}

impl WalletRegistry {
    /// Create a registry over `store`
    pub fn new(store: TypedStore) -> Self {
        Self { store }
    }

    /// All wallets, in insertion order
    pub async fn list(&self) -> Result<Vec<WalletInfo>> {
        self.store.get(StorageKey::Wallets).await
    }

    /// Wallet with the given public key
    pub async fn get_by_pubkey(&self, pubkey: &str) -> Result<Option<WalletInfo>> {
        Ok(self.list().await?.into_iter().find(|w| w.pubkey == pubkey))
    }

    /// Wallet with the given address
    pub async fn get_by_address(&self, address: &str) -> Result<Option<WalletInfo>> {
        Ok(self.list().await?.into_iter().find(|w| w.address == address))
    }

    /// Add a wallet; returns the stored collection
    pub async fn add(&self, wallet: WalletInfo) -> Result<Vec<WalletInfo>> {
        let mut wallets = self.list().await?;

        if wallets.iter().any(|w| w.pubkey == wallet.pubkey) {
            tracing::debug!(pubkey = wallet.pubkey.as_str(), "Wallet already registered");
            return Ok(wallets);
        }

        if wallet.wallet_type == WalletType::LocalSecret {
            let before = wallets.len();
            wallets.retain(|w| w.wallet_type != WalletType::LocalSecret);
            if wallets.len() != before {
                tracing::info!("Replacing existing local-secret wallet");
            }
        }

        tracing::info!(
            pubkey = wallet.pubkey.as_str(),
            wallet_type = ?wallet.wallet_type,
            "Wallet added"
        );
        wallets.push(wallet);
        self.store.set(StorageKey::Wallets, &wallets).await?;
        Ok(wallets)
    }

    /// Remove the wallet with `pubkey`; clears the active pointer if it
    /// referenced it
    pub async fn remove(&self, pubkey: &str) -> Result<Vec<WalletInfo>> {
        let mut wallets = self.list().await?;
        wallets.retain(|w| w.pubkey != pubkey);
        self.store.set(StorageKey::Wallets, &wallets).await?;

        if self.active().await?.is_some_and(|w| w.pubkey == pubkey) {
            self.store.delete(StorageKey::ActiveWallet).await?;
            tracing::info!(pubkey, "Removed the active wallet");
        }
        Ok(wallets)
    }

    /// Remove every wallet and the active pointer
    pub async fn remove_all(&self) -> Result<()> {
        self.store.delete(StorageKey::Wallets).await?;
        self.store.delete(StorageKey::ActiveWallet).await?;
        Ok(())
    }

    /// Point the active wallet at `wallet`
    pub async fn set_active(&self, wallet: &WalletInfo) -> Result<()> {
        self.store.set(StorageKey::ActiveWallet, wallet).await
    }

    /// The active wallet, if any
    pub async fn active(&self) -> Result<Option<WalletInfo>> {
        self.store.get(StorageKey::ActiveWallet).await
    }

    /// The active network (mainnet when unset)
    pub async fn active_network(&self) -> Result<Network> {
        self.store.get(StorageKey::ActiveNetwork).await
    }

    /// Point the active network at `network`
    pub async fn set_active_network(&self, network: &Network) -> Result<()> {
        self.store.set(StorageKey::ActiveNetwork, network).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::{KEY_A, KEY_B};
    use crate::message::NetworkType;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn registry() -> WalletRegistry {
        WalletRegistry::new(TypedStore::new(Arc::new(MemoryStorage::new())))
    }

    fn remote(key: &str) -> WalletInfo {
        WalletInfo::remote_pairing(PeerDescriptor::paired(key, "Remote").unwrap(), "addr-remote")
    }

    #[tokio::test]
    async fn test_single_local_secret() {
        let registry = registry();

        registry.add(WalletInfo::local_secret("pk1", "addr1", "slot-1")).await.unwrap();
        registry.add(remote(KEY_A)).await.unwrap();
        registry.add(WalletInfo::local_secret("pk2", "addr2", "slot-2")).await.unwrap();
        registry.add(WalletInfo::local_secret("pk3", "addr3", "slot-3")).await.unwrap();

        let wallets = registry.list().await.unwrap();
        let locals: Vec<_> = wallets
            .iter()
            .filter(|w| w.wallet_type == WalletType::LocalSecret)
            .collect();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].pubkey, "pk3");
        assert_eq!(wallets.len(), 2);
    }

    #[tokio::test]
    async fn test_add_is_idempotent_by_pubkey() {
        let registry = registry();

        registry.add(remote(KEY_A)).await.unwrap();
        let before = registry.list().await.unwrap();

        let mut duplicate = remote(KEY_A);
        duplicate.address = "different".into();
        let after = registry.add(duplicate).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_pubkey_and_address() {
        let registry = registry();
        registry.add(WalletInfo::local_secret("pk1", "addr1", "slot")).await.unwrap();
        registry.add(remote(KEY_B)).await.unwrap();

        assert_eq!(
            registry.get_by_address("addr1").await.unwrap().unwrap().pubkey,
            "pk1"
        );
        assert!(registry.get_by_pubkey(KEY_B).await.unwrap().unwrap().is_remote());
        assert!(registry.get_by_pubkey("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_active_pointer() {
        let registry = registry();
        let wallet = remote(KEY_A);
        registry.add(wallet.clone()).await.unwrap();
        registry.set_active(&wallet).await.unwrap();
        assert!(registry.active().await.unwrap().is_some());

        let remaining = registry.remove(KEY_A).await.unwrap();
        assert!(remaining.is_empty());
        assert!(registry.active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let registry = registry();
        let wallet = WalletInfo::local_secret("pk1", "addr1", "slot");
        registry.add(wallet.clone()).await.unwrap();
        registry.set_active(&wallet).await.unwrap();

        registry.remove_all().await.unwrap();
        assert!(registry.list().await.unwrap().is_empty());
        assert!(registry.active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_network_default_and_set() {
        let registry = registry();
        assert_eq!(registry.active_network().await.unwrap(), Network::mainnet());

        let testnet = Network::of(NetworkType::Testnet);
        registry.set_active_network(&testnet).await.unwrap();
        assert_eq!(registry.active_network().await.unwrap(), testnet);
    }

    #[test]
    fn test_wallet_wire_shape() {
        let wallet = WalletInfo::local_secret("pk1", "addr1", "slot-1");
        let value = serde_json::to_value(&wallet).unwrap();
        assert_eq!(value["type"], "LOCAL_SECRET");
        assert_eq!(value["info"]["secretRef"], "slot-1");

        let back: WalletInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, wallet);
    }
}

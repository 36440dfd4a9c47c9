//! # Bridge Client
//!
//! The background context's collaborators, wired together once at startup
//! and shared by every handler.
//!
//! ## Response Delivery
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         send_to_page(response)                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  (a) ledger.take(response.id) ──────────── missing ──► RequestNotFound  │
//! │           │                                                             │
//! │  (b) PermissionResponse && persist? ──► PermissionStore.add             │
//! │           │                                                             │
//! │  (c) codec.encode(response)                                             │
//! │           │                                                             │
//! │           ├── context has a reply channel ──► direct reply              │
//! │           │                                                             │
//! │  (d) requester peer with senderId == request.senderId                   │
//! │           │                          └── none ──► dropped (logged)      │
//! │  (e) requesters.send_to_peer(peer.publicKey, encoded)                   │
//! │                                                                         │
//! │  Any failure after (a) puts the ledger entry back.                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::account::{account_identifier, address_from_public_key};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::ledger::{PendingRequestEntry, PendingRequests};
use crate::message::{
    build_response, ConnectionContext, DomainMessage, Envelope, MessageType, Target,
    UserDecision, BACKGROUND_SENDER,
};
use crate::popup::{PopupEvent, PopupRelay};
use crate::registry::{PermissionInfo, Registries};
use crate::storage::Storage;
use crate::transport::PairingTransport;
use crate::BridgeConfig;

/// Where a response ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Delivery {
    /// Sent on the originating context's reply channel
    Direct {
        /// Originating context
        context_id: String,
    },
    /// Sent to one requester peer
    Peer {
        /// Originating context
        context_id: String,
        /// Recipient public key
        public_key: String,
    },
    /// No destination matched; the response was dropped
    Dropped {
        /// Originating context
        context_id: String,
    },
}

/// External collaborators the client is built from
pub struct BridgeParts {
    /// Persistence backend for every registry
    pub storage: Arc<dyn Storage>,
    /// Message codec
    pub codec: Arc<dyn Codec>,
    /// Transport whose peers are requesters
    pub requesters: Arc<dyn PairingTransport>,
    /// Transport whose peers are remote signing wallets
    pub remote_wallets: Arc<dyn PairingTransport>,
    /// Popup relay
    pub popup: PopupRelay,
}

/// Shared state and operations of the background context
pub struct BridgeClient {
    config: BridgeConfig,
    registries: Registries,
    ledger: PendingRequests,
    codec: Arc<dyn Codec>,
    requesters: Arc<dyn PairingTransport>,
    remote_wallets: Arc<dyn PairingTransport>,
    popup: PopupRelay,
}

impl BridgeClient {
    /// Wire a client from its parts
    pub fn new(config: BridgeConfig, parts: BridgeParts) -> Self {
        Self {
            config,
            registries: Registries::new(parts.storage),
            ledger: PendingRequests::new(),
            codec: parts.codec,
            requesters: parts.requesters,
            remote_wallets: parts.remote_wallets,
            popup: parts.popup,
        }
    }

    /// Configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Wallet, permission and metadata registries
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Outstanding requests
    pub fn ledger(&self) -> &PendingRequests {
        &self.ledger
    }

    /// Message codec
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Transport whose peers are requesters
    pub fn requesters(&self) -> &Arc<dyn PairingTransport> {
        &self.requesters
    }

    /// Transport whose peers are remote wallets
    pub fn remote_wallets(&self) -> &Arc<dyn PairingTransport> {
        &self.remote_wallets
    }

    /// Popup relay
    pub fn popup(&self) -> &PopupRelay {
        &self.popup
    }

    /// Connect both transports. Transports that are already up are left alone.
    pub async fn connect(&self) -> Result<()> {
        for transport in [&self.requesters, &self.remote_wallets] {
            if !transport.is_connected() {
                transport.connect().await?;
            }
        }
        Ok(())
    }

    /// Whether requests go to a remote wallet instead of the popup
    pub async fn is_remote_connected(&self) -> Result<bool> {
        Ok(self
            .registries
            .wallets
            .active()
            .await?
            .is_some_and(|wallet| wallet.is_remote()))
    }

    // ========================================================================
    // REQUEST SIDE
    // ========================================================================

    /// Remember a request so its response can be routed back
    pub fn record_request(&self, message: DomainMessage, connection: ConnectionContext) {
        tracing::debug!(
            id = message.id.as_str(),
            sender_id = message.sender_id.as_str(),
            kind = ?message.message_type,
            "Request recorded"
        );
        self.ledger.record(message, connection);
    }

    /// Show a request in the popup
    pub async fn present(&self, message: DomainMessage) -> Result<()> {
        let envelope = Envelope::new(
            Target::Extension,
            BACKGROUND_SENDER,
            PopupEvent::Request { message },
        )?;
        self.popup.send_to_popup(envelope).await;
        Ok(())
    }

    /// Forward a request to every paired remote wallet
    pub async fn forward_to_remote(&self, message: &DomainMessage) -> Result<()> {
        let encoded = self.codec.encode(message)?;
        self.remote_wallets.send(&encoded).await?;
        tracing::debug!(id = message.id.as_str(), "Request forwarded to remote wallet");
        Ok(())
    }

    // ========================================================================
    // RESPONSE SIDE
    // ========================================================================

    /// Answer a pending request with the user's decision
    pub async fn respond(&self, request_id: &str, decision: UserDecision) -> Result<Delivery> {
        let entry = self
            .ledger
            .get(request_id)
            .ok_or_else(|| Error::RequestNotFound(request_id.to_string()))?;

        let response = build_response(&entry.message, decision, &self.config.sender_id)?;
        self.send_to_page(response, true).await
    }

    /// Route a response to whoever sent the matching request
    ///
    /// With `persist`, a `PermissionResponse` is recorded in the
    /// permission store before it is sent.
    pub async fn send_to_page(&self, response: DomainMessage, persist: bool) -> Result<Delivery> {
        let entry = self.ledger.take(&response.id)?;

        match self.deliver(&entry, &response, persist).await {
            Ok(delivery) => Ok(delivery),
            Err(e) => {
                self.ledger.restore(entry);
                Err(e)
            }
        }
    }

    async fn deliver(
        &self,
        entry: &PendingRequestEntry,
        response: &DomainMessage,
        persist: bool,
    ) -> Result<Delivery> {
        if persist && response.message_type == MessageType::PermissionResponse {
            self.persist_permission(entry, response).await?;
        }

        let encoded = self.codec.encode(response)?;
        let context_id = entry.connection.id.clone();

        if entry.connection.responder.is_attached() {
            let reply = Envelope::new(Target::Page, BACKGROUND_SENDER, &encoded)?;
            if entry.connection.responder.send(serde_json::to_value(reply)?) {
                tracing::debug!(id = response.id.as_str(), context_id = context_id.as_str(), "Response sent on reply channel");
                return Ok(Delivery::Direct { context_id });
            }
        }

        let Some(sender_id) = entry.message.routable_sender_id() else {
            tracing::warn!(
                id = response.id.as_str(),
                "Request has no routable sender id, dropping response"
            );
            return Ok(Delivery::Dropped { context_id });
        };

        let peers = self.requesters.peers().await?;
        match peers.iter().find(|peer| peer.sender_id == sender_id) {
            Some(peer) => {
                self.requesters.send_to_peer(&peer.public_key, &encoded).await?;
                tracing::debug!(
                    id = response.id.as_str(),
                    sender_id,
                    "Response sent to requester"
                );
                Ok(Delivery::Peer {
                    context_id,
                    public_key: peer.public_key.clone(),
                })
            }
            None => {
                let err = Error::PeerNotFound(sender_id.to_string());
                tracing::warn!(
                    id = response.id.as_str(),
                    code = err.code(),
                    "{}, dropping response",
                    err
                );
                Ok(Delivery::Dropped { context_id })
            }
        }
    }

    async fn persist_permission(
        &self,
        entry: &PendingRequestEntry,
        response: &DomainMessage,
    ) -> Result<PermissionInfo> {
        let pubkey = response.public_key.clone().ok_or_else(|| {
            Error::InvalidEnvelope("permission response without publicKey".into())
        })?;

        let network = match &response.network {
            Some(network) => network.clone(),
            None => self.registries.wallets.active_network().await?,
        };

        let address = match self.registries.wallets.get_by_pubkey(&pubkey).await? {
            Some(wallet) => wallet.address,
            None => address_from_public_key(&pubkey)?,
        };

        let permission = PermissionInfo {
            account_identifier: account_identifier(&address, &network),
            sender_id: entry.message.sender_id.clone(),
            app_metadata: entry.message.app_metadata.clone(),
            origin_id: entry.connection.id.clone(),
            address,
            pubkey,
            network,
            scopes: response.scopes.clone().unwrap_or_default(),
            connected_at: crate::time::now_timestamp_millis(),
        };

        self.registries.permissions.add(permission.clone()).await?;
        tracing::info!(
            account_identifier = permission.account_identifier.as_str(),
            sender_id = permission.sender_id.as_str(),
            scopes = permission.scopes.len(),
            "Permission granted"
        );
        Ok(permission)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::account::tests::{KEY_A, KEY_B};
    use crate::codec::Base58CheckCodec;
    use crate::message::{Network, Origin, Responder, Scope};
    use crate::popup::ChannelPopup;
    use crate::registry::WalletInfo;
    use crate::storage::MemoryStorage;
    use crate::transport::{ChannelTransport, OutboundFrame, PeerDescriptor, TransportConfig};
    use tokio::sync::mpsc;

    /// A client wired to in-memory collaborators, plus the far ends of its
    /// channels
    pub(crate) struct Harness {
        pub client: Arc<BridgeClient>,
        pub requesters: Arc<ChannelTransport>,
        pub remote_wallets: Arc<ChannelTransport>,
        pub requester_out: mpsc::UnboundedReceiver<OutboundFrame>,
        pub remote_out: mpsc::UnboundedReceiver<OutboundFrame>,
        pub popup: Arc<ChannelPopup>,
        pub popup_inbox: mpsc::UnboundedReceiver<Envelope>,
    }

    impl Harness {
        pub async fn new() -> Self {
            let (requesters, requester_out) = ChannelTransport::new(TransportConfig {
                name: "requesters".into(),
                ..Default::default()
            });
            let (remote_wallets, remote_out) = ChannelTransport::new(TransportConfig {
                name: "remote-wallets".into(),
                ..Default::default()
            });
            let requesters = Arc::new(requesters);
            let remote_wallets = Arc::new(remote_wallets);
            let (popup, popup_inbox) = ChannelPopup::new();
            let popup = Arc::new(popup);

            let client = Arc::new(BridgeClient::new(
                BridgeConfig::default(),
                BridgeParts {
                    storage: Arc::new(MemoryStorage::new()),
                    codec: Arc::new(Base58CheckCodec),
                    requesters: requesters.clone(),
                    remote_wallets: remote_wallets.clone(),
                    popup: PopupRelay::new(popup.clone()),
                },
            ));
            client.connect().await.unwrap();

            Self {
                client,
                requesters,
                remote_wallets,
                requester_out,
                remote_out,
                popup,
                popup_inbox,
            }
        }

        /// Pair a requester and return its sender id
        pub async fn pair_requester(&self, key: &str) -> String {
            self.requesters
                .add_peer(PeerDescriptor::paired(key, "Dapp").unwrap())
                .await
                .unwrap()
                .sender_id
        }
    }

    fn permission_request(id: &str, sender_id: &str) -> DomainMessage {
        DomainMessage::new(id, MessageType::PermissionRequest, sender_id)
    }

    fn grant() -> UserDecision {
        UserDecision::GrantPermission {
            public_key: KEY_B.into(),
            network: Network::mainnet(),
            scopes: vec![Scope::ReadAddress, Scope::Sign],
        }
    }

    #[tokio::test]
    async fn test_permission_grant_is_persisted_and_sent_to_matching_peer() {
        let mut h = Harness::new().await;
        let dapp1 = h.pair_requester(KEY_A).await;
        h.client
            .registries()
            .wallets
            .add(WalletInfo::local_secret(KEY_B, "addr-local", "slot"))
            .await
            .unwrap();

        h.client.record_request(
            permission_request("r1", &dapp1),
            ConnectionContext::new("https://dapp.example", Origin::Requester),
        );

        let delivery = h.client.respond("r1", grant()).await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Peer {
                context_id: "https://dapp.example".into(),
                public_key: KEY_A.into(),
            }
        );

        let permissions = h.client.registries().permissions.list().await.unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(
            permissions[0].account_identifier,
            account_identifier("addr-local", &Network::mainnet())
        );
        assert_eq!(permissions[0].origin_id, "https://dapp.example");
        assert_eq!(permissions[0].scopes, vec![Scope::ReadAddress, Scope::Sign]);

        let frame = h.requester_out.recv().await.unwrap();
        assert_eq!(frame.to, KEY_A);
        let sent = h.client.codec().decode(&frame.message).unwrap();
        assert_eq!(sent.id, "r1");
        assert_eq!(sent.message_type, MessageType::PermissionResponse);
        assert!(h.requester_out.try_recv().is_err());
        assert!(h.client.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_unrecorded_id_is_request_not_found() {
        let h = Harness::new().await;
        let response = DomainMessage::new("nope", MessageType::OperationResponse, "wallet");

        let result = h.client.send_to_page(response, true).await;
        assert!(matches!(result, Err(Error::RequestNotFound(_))));
        assert!(matches!(
            h.client.respond("nope", grant()).await,
            Err(Error::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_response_for_same_id_fails() {
        let h = Harness::new().await;
        let dapp1 = h.pair_requester(KEY_A).await;
        h.client.record_request(
            DomainMessage::new("r1", MessageType::OperationRequest, &dapp1),
            ConnectionContext::new("tab", Origin::Page),
        );

        let first = DomainMessage::new("r1", MessageType::OperationResponse, "wallet");
        assert!(h.client.send_to_page(first.clone(), false).await.is_ok());
        assert!(matches!(
            h.client.send_to_page(first, false).await,
            Err(Error::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_sender_is_dropped() {
        let mut h = Harness::new().await;
        h.pair_requester(KEY_A).await;
        h.client.record_request(
            permission_request("r1", "someone-else"),
            ConnectionContext::new("tab", Origin::Page),
        );

        let response = DomainMessage::new("r1", MessageType::PermissionResponse, "wallet");
        let delivery = h.client.send_to_page(response, false).await.unwrap();

        assert_eq!(delivery, Delivery::Dropped { context_id: "tab".into() });
        assert!(h.requester_out.try_recv().is_err());
        assert!(h.client.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_direct_reply_channel_wins() {
        let mut h = Harness::new().await;
        let dapp1 = h.pair_requester(KEY_A).await;
        let (responder, mut replies) = Responder::channel();
        h.client.record_request(
            DomainMessage::new("r1", MessageType::BroadcastRequest, &dapp1),
            ConnectionContext::new("tab-7", Origin::Page).with_responder(responder),
        );

        let response = DomainMessage::new("r1", MessageType::BroadcastResponse, "wallet");
        let delivery = h.client.send_to_page(response, false).await.unwrap();

        assert_eq!(delivery, Delivery::Direct { context_id: "tab-7".into() });
        let reply: Envelope = serde_json::from_value(replies.recv().await.unwrap()).unwrap();
        assert_eq!(reply.target, Target::Page);
        let decoded = h
            .client
            .codec()
            .decode(reply.payload.as_str().unwrap())
            .unwrap();
        assert_eq!(decoded.id, "r1");
        assert!(h.requester_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_permission_responses_skip_persistence() {
        let h = Harness::new().await;
        let dapp1 = h.pair_requester(KEY_A).await;
        h.client.record_request(
            permission_request("r1", &dapp1),
            ConnectionContext::new("tab", Origin::Page),
        );

        let rejected = h
            .client
            .respond(
                "r1",
                UserDecision::Reject {
                    error_type: crate::message::ErrorType::Aborted,
                },
            )
            .await
            .unwrap();
        assert!(matches!(rejected, Delivery::Peer { .. }));
        assert!(h.client.registries().permissions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_restores_entry() {
        let h = Harness::new().await;
        let dapp1 = h.pair_requester(KEY_A).await;
        h.client.record_request(
            permission_request("r1", &dapp1),
            ConnectionContext::new("tab", Origin::Page),
        );

        // Permission response without a public key cannot be persisted
        let response = DomainMessage::new("r1", MessageType::PermissionResponse, "wallet");
        assert!(matches!(
            h.client.send_to_page(response, true).await,
            Err(Error::InvalidEnvelope(_))
        ));
        assert!(h.client.ledger().get("r1").is_some());
    }

    #[tokio::test]
    async fn test_remote_connected_follows_active_wallet() {
        let h = Harness::new().await;
        assert!(!h.client.is_remote_connected().await.unwrap());

        let local = WalletInfo::local_secret("pk1", "addr1", "slot");
        h.client.registries().wallets.set_active(&local).await.unwrap();
        assert!(!h.client.is_remote_connected().await.unwrap());

        let remote = WalletInfo::remote_pairing(PeerDescriptor::paired(KEY_B, "Phone").unwrap(), "addr2");
        h.client.registries().wallets.set_active(&remote).await.unwrap();
        assert!(h.client.is_remote_connected().await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let h = Harness::new().await;
        h.pair_requester(KEY_A).await;
        assert!(h.requesters.is_connected());
        assert!(h.remote_wallets.is_connected());

        let mut events = h.requesters.subscribe();
        h.client.connect().await.unwrap();

        // No second Connected event and the paired peer is still there
        assert!(events.try_recv().is_err());
        assert_eq!(h.requesters.peers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_to_remote_needs_peers() {
        let mut h = Harness::new().await;
        let request = permission_request("r1", "dapp1");

        assert!(matches!(
            h.client.forward_to_remote(&request).await,
            Err(Error::TransportNotReady(_))
        ));

        h.remote_wallets
            .add_peer(PeerDescriptor::paired(KEY_B, "Phone").unwrap())
            .await
            .unwrap();
        h.client.forward_to_remote(&request).await.unwrap();
        assert_eq!(h.remote_out.recv().await.unwrap().to, KEY_B);
    }
}

//! # Action Handler Table
//!
//! Background-context actions and the table that maps each one to its
//! handler.
//!
//! ## Wire Shape
//!
//! ```text
//! request:  { "action": "wallet_add", "data": { "wallet": { ... } } }
//! reply:    { "action": "wallet_add", "data": { "wallets": [ ... ] } }
//! failure:  { "action": "wallet_add", "error": { "code": 401, ... } }
//! ```
//!
//! Handlers are grouped by concern:
//!   - `wallet`      - wallet CRUD and the active-wallet pointer
//!   - `network`     - handshake and the active-network pointer
//!   - `permissions` - permission and app-metadata stores
//!   - `peers`       - transport peers, remote pairing and the ledger
//!   - `response`    - answering a pending request

mod network;
mod peers;
mod permissions;
mod response;
mod wallet;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::BridgeClient;
use crate::error::{Error, ErrorReport, Result};
use crate::message::{DomainMessage, Network, Responder, UserDecision};
use crate::registry::WalletInfo;
use crate::transport::PeerDescriptor;

/// Every action the background context accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    /// Identify this bridge
    Handshake,
    /// List wallets
    WalletsGet,
    /// Add a wallet
    WalletAdd {
        /// Wallet to add
        wallet: WalletInfo,
    },
    /// Remove a wallet
    WalletDelete {
        /// Wallet to remove (matched by pubkey)
        wallet: WalletInfo,
    },
    /// Remove every wallet
    WalletsDeleteAll,
    /// Read the active wallet
    ActiveWalletGet,
    /// Set the active wallet
    ActiveWalletSet {
        /// New active wallet
        wallet: WalletInfo,
    },
    /// Read the active network
    ActiveNetworkGet,
    /// Set the active network
    ActiveNetworkSet {
        /// New active network
        network: Network,
    },
    /// List permissions
    PermissionsGet,
    /// Remove every permission for an account
    PermissionDelete {
        /// Account to revoke
        account_identifier: String,
    },
    /// Remove every permission
    PermissionsDeleteAll,
    /// List requester metadata
    AppMetadataGet,
    /// Remove one requester's metadata
    AppMetadataDelete {
        /// Requester to forget
        sender_id: String,
    },
    /// Remove all requester metadata
    AppMetadataDeleteAll,
    /// List peers on both transports
    PeersGet,
    /// Unpair a peer from whichever transport knows it
    PeerRemove {
        /// Peer to remove
        public_key: String,
    },
    /// Pair a remote signing wallet and make it active
    RemotePair {
        /// The remote wallet's pairing descriptor
        peer: PeerDescriptor,
        /// Account address; derived from the key when absent
        #[serde(default)]
        address: Option<String>,
    },
    /// List outstanding requests
    PendingRequestsGet,
    /// Answer a pending request
    Response {
        /// The request being answered
        request: DomainMessage,
        /// The user's decision
        decision: UserDecision,
    },
}

/// Discriminant of [`Action`]
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Handshake,
    WalletsGet,
    WalletAdd,
    WalletDelete,
    WalletsDeleteAll,
    ActiveWalletGet,
    ActiveWalletSet,
    ActiveNetworkGet,
    ActiveNetworkSet,
    PermissionsGet,
    PermissionDelete,
    PermissionsDeleteAll,
    AppMetadataGet,
    AppMetadataDelete,
    AppMetadataDeleteAll,
    PeersGet,
    PeerRemove,
    RemotePair,
    PendingRequestsGet,
    Response,
}

impl ActionKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Handshake => "handshake",
            ActionKind::WalletsGet => "wallets_get",
            ActionKind::WalletAdd => "wallet_add",
            ActionKind::WalletDelete => "wallet_delete",
            ActionKind::WalletsDeleteAll => "wallets_delete_all",
            ActionKind::ActiveWalletGet => "active_wallet_get",
            ActionKind::ActiveWalletSet => "active_wallet_set",
            ActionKind::ActiveNetworkGet => "active_network_get",
            ActionKind::ActiveNetworkSet => "active_network_set",
            ActionKind::PermissionsGet => "permissions_get",
            ActionKind::PermissionDelete => "permission_delete",
            ActionKind::PermissionsDeleteAll => "permissions_delete_all",
            ActionKind::AppMetadataGet => "app_metadata_get",
            ActionKind::AppMetadataDelete => "app_metadata_delete",
            ActionKind::AppMetadataDeleteAll => "app_metadata_delete_all",
            ActionKind::PeersGet => "peers_get",
            ActionKind::PeerRemove => "peer_remove",
            ActionKind::RemotePair => "remote_pair",
            ActionKind::PendingRequestsGet => "pending_requests_get",
            ActionKind::Response => "response",
        }
    }
}

impl Action {
    /// Discriminant
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Handshake => ActionKind::Handshake,
            Action::WalletsGet => ActionKind::WalletsGet,
            Action::WalletAdd { .. } => ActionKind::WalletAdd,
            Action::WalletDelete { .. } => ActionKind::WalletDelete,
            Action::WalletsDeleteAll => ActionKind::WalletsDeleteAll,
            Action::ActiveWalletGet => ActionKind::ActiveWalletGet,
            Action::ActiveWalletSet { .. } => ActionKind::ActiveWalletSet,
            Action::ActiveNetworkGet => ActionKind::ActiveNetworkGet,
            Action::ActiveNetworkSet { .. } => ActionKind::ActiveNetworkSet,
            Action::PermissionsGet => ActionKind::PermissionsGet,
            Action::PermissionDelete { .. } => ActionKind::PermissionDelete,
            Action::PermissionsDeleteAll => ActionKind::PermissionsDeleteAll,
            Action::AppMetadataGet => ActionKind::AppMetadataGet,
            Action::AppMetadataDelete { .. } => ActionKind::AppMetadataDelete,
            Action::AppMetadataDeleteAll => ActionKind::AppMetadataDeleteAll,
            Action::PeersGet => ActionKind::PeersGet,
            Action::PeerRemove { .. } => ActionKind::PeerRemove,
            Action::RemotePair { .. } => ActionKind::RemotePair,
            Action::PendingRequestsGet => ActionKind::PendingRequestsGet,
            Action::Response { .. } => ActionKind::Response,
        }
    }
}

/// Parse a BACKGROUND payload
///
/// An `action` name outside the table is [`Error::UnknownAction`]; a known
/// name with a malformed body is [`Error::InvalidEnvelope`].
pub fn parse_action(payload: &Value) -> Result<Action> {
    let name = payload
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidEnvelope("background payload without action".into()))?;

    serde_json::from_value::<ActionKind>(Value::String(name.to_string()))
        .map_err(|_| Error::UnknownAction(name.to_string()))?;

    serde_json::from_value(payload.clone())
        .map_err(|e| Error::InvalidEnvelope(format!("{}: {}", name, e)))
}

// ============================================================================
// HANDLER CONTEXT
// ============================================================================

/// Everything a handler gets
pub struct ActionContext {
    /// The parsed action
    pub data: Action,
    /// Reply channel back to the originating context
    pub send_response: Responder,
    /// Registries, transports, ledger and popup
    pub client: Arc<BridgeClient>,
}

impl ActionContext {
    /// Bundle a parsed action with its reply channel
    pub fn new(data: Action, send_response: Responder, client: Arc<BridgeClient>) -> Self {
        Self {
            data,
            send_response,
            client,
        }
    }

    /// Reply `{action, data}`
    pub fn reply(&self, data: impl Serialize) -> Result<()> {
        let value = json!({
            "action": self.data.kind().as_str(),
            "data": serde_json::to_value(data)?,
        });
        self.send_response.send(value);
        Ok(())
    }

    /// Reply `{action, error}`
    pub fn reply_error(&self, error: &Error) {
        send_error(&self.send_response, self.data.kind().as_str(), error);
    }

    /// Error for a handler invoked with the wrong action
    fn unexpected(&self, expected: ActionKind) -> Error {
        Error::Internal(format!(
            "{} handler invoked with {}",
            expected.as_str(),
            self.data.kind().as_str()
        ))
    }
}

/// Reply `{action, error}` on `responder`
pub fn send_error(responder: &Responder, action: &str, error: &Error) {
    responder.send(json!({
        "action": action,
        "error": ErrorReport::from(error),
    }));
}

/// A handler in the table
pub type ActionHandler = fn(ActionContext) -> BoxFuture<'static, Result<()>>;

/// Handler for `kind`
pub fn get_handler(kind: ActionKind) -> ActionHandler {
    match kind {
        ActionKind::Handshake => network::handshake,
        ActionKind::WalletsGet => wallet::wallets_get,
        ActionKind::WalletAdd => wallet::wallet_add,
        ActionKind::WalletDelete => wallet::wallet_delete,
        ActionKind::WalletsDeleteAll => wallet::wallets_delete_all,
        ActionKind::ActiveWalletGet => wallet::active_wallet_get,
        ActionKind::ActiveWalletSet => wallet::active_wallet_set,
        ActionKind::ActiveNetworkGet => network::active_network_get,
        ActionKind::ActiveNetworkSet => network::active_network_set,
        ActionKind::PermissionsGet => permissions::permissions_get,
        ActionKind::PermissionDelete => permissions::permission_delete,
        ActionKind::PermissionsDeleteAll => permissions::permissions_delete_all,
        ActionKind::AppMetadataGet => permissions::app_metadata_get,
        ActionKind::AppMetadataDelete => permissions::app_metadata_delete,
        ActionKind::AppMetadataDeleteAll => permissions::app_metadata_delete_all,
        ActionKind::PeersGet => peers::peers_get,
        ActionKind::PeerRemove => peers::peer_remove,
        ActionKind::RemotePair => peers::remote_pair,
        ActionKind::PendingRequestsGet => peers::pending_requests_get,
        ActionKind::Response => response::response,
    }
}

/// Run `action` through the table
pub async fn run(action: Action, send_response: Responder, client: Arc<BridgeClient>) -> Result<()> {
    let kind = action.kind();
    tracing::debug!(action = kind.as_str(), "Running action");
    get_handler(kind)(ActionContext::new(action, send_response, client)).await
}

//! # Messages
//!
//! Everything that travels between contexts and peers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           MESSAGE LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Envelope { target, sender, payload }      routed by `target` only     │
//! │     │                                                                   │
//! │     ├── PAGE        → encoded string or DomainMessage                   │
//! │     ├── BACKGROUND  → Action { action, data }                           │
//! │     └── EXTENSION   → anything the popup understands                    │
//! │                                                                         │
//! │  DomainMessage { id, type, version, senderId, ... }                    │
//! │     request ──(same id)──► response                                     │
//! │                                                                         │
//! │  UserDecision  (what the popup hands back)                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod decision;
mod envelope;

pub use decision::{build_response, error_response, UserDecision};
pub use envelope::{ConnectionContext, Envelope, Origin, PagePayload, Responder, Target};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version stamped on messages created by this engine
pub const PROTOCOL_VERSION: &str = "2";

/// Legacy protocol version; requests carrying it have no usable sender id
pub const LEGACY_VERSION: &str = "1";

/// `sender` stamped on envelopes produced by the background context
pub const BACKGROUND_SENDER: &str = "background";

/// `sender` stamped on envelopes produced by the popup context
pub const POPUP_SENDER: &str = "popup";

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Kind of a [`DomainMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Requester asks for account access
    PermissionRequest,
    /// Wallet grants account access
    PermissionResponse,
    /// Requester asks to submit an operation
    OperationRequest,
    /// Operation was submitted
    OperationResponse,
    /// Requester asks to sign an arbitrary payload
    SignPayloadRequest,
    /// Payload was signed
    SignPayloadResponse,
    /// Requester asks to broadcast a signed transaction
    BroadcastRequest,
    /// Transaction was broadcast
    BroadcastResponse,
    /// Requester ends the session
    Disconnect,
    /// A request failed or was rejected
    Error,
}

impl MessageType {
    /// Whether this kind starts an exchange (and gets a ledger entry)
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MessageType::PermissionRequest
                | MessageType::OperationRequest
                | MessageType::SignPayloadRequest
                | MessageType::BroadcastRequest
        )
    }

    /// The response kind that answers this request kind
    pub fn response_type(&self) -> Option<MessageType> {
        match self {
            MessageType::PermissionRequest => Some(MessageType::PermissionResponse),
            MessageType::OperationRequest => Some(MessageType::OperationResponse),
            MessageType::SignPayloadRequest => Some(MessageType::SignPayloadResponse),
            MessageType::BroadcastRequest => Some(MessageType::BroadcastResponse),
            _ => None,
        }
    }

    /// Scope a requester must hold before this request is shown to the user
    pub fn required_scope(&self) -> Option<Scope> {
        match self {
            MessageType::OperationRequest => Some(Scope::OperationRequest),
            MessageType::SignPayloadRequest => Some(Scope::Sign),
            _ => None,
        }
    }
}

/// Capability a requester can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Read the account address
    ReadAddress,
    /// Sign payloads
    Sign,
    /// Submit operations
    OperationRequest,
    /// Request payments
    PaymentRequest,
    /// Spend below a threshold without prompting
    Threshold,
}

/// Reason attached to an `Error` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    /// The user cancelled the prompt
    #[serde(rename = "ABORTED_ERROR")]
    Aborted,
    /// The requester has no permission for this request
    #[serde(rename = "NOT_GRANTED_ERROR")]
    NotGranted,
    /// No address is available to answer with
    #[serde(rename = "NO_ADDRESS_ERROR")]
    NoAddress,
    /// Request parameters were rejected
    #[serde(rename = "PARAMETERS_INVALID_ERROR")]
    ParametersInvalid,
    /// The transaction was rejected
    #[serde(rename = "TRANSACTION_INVALID_ERROR")]
    TransactionInvalid,
    /// Anything else
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

// ============================================================================
// NETWORK
// ============================================================================

/// Network family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Production network
    #[default]
    Mainnet,
    /// Public test network
    Testnet,
    /// User-supplied node
    Custom,
}

impl NetworkType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
            NetworkType::Custom => "custom",
        }
    }
}

/// A network a permission is scoped to
///
/// Accepts either the bare type string (`"mainnet"`) or the full object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "NetworkRepr")]
pub struct Network {
    /// Network family
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    /// Display name (custom networks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Node URL (custom networks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl Network {
    /// The default production network
    pub fn mainnet() -> Self {
        Self::default()
    }

    /// A network of the given family with no name or node override
    pub fn of(network_type: NetworkType) -> Self {
        Self {
            network_type,
            name: None,
            rpc_url: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NetworkRepr {
    Bare(NetworkType),
    #[serde(rename_all = "camelCase")]
    Full {
        #[serde(rename = "type")]
        network_type: NetworkType,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        rpc_url: Option<String>,
    },
}

impl From<NetworkRepr> for Network {
    fn from(repr: NetworkRepr) -> Self {
        match repr {
            NetworkRepr::Bare(network_type) => Network::of(network_type),
            NetworkRepr::Full {
                network_type,
                name,
                rpc_url,
            } => Network {
                network_type,
                name,
                rpc_url,
            },
        }
    }
}

// ============================================================================
// APP METADATA
// ============================================================================

/// Descriptive record a requester sends about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    /// Requester's sender id
    pub sender_id: String,
    /// Display name
    pub name: String,
    /// Icon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

// ============================================================================
// DOMAIN MESSAGE
// ============================================================================

/// A decoded protocol message
///
/// Fields the engine does not interpret (operation details, payloads to
/// sign, signed transactions) ride along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMessage {
    /// Correlation id shared by a request and its response
    pub id: String,
    /// Message kind
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Protocol version
    pub version: String,
    /// Sender id of whoever produced this message
    pub sender_id: String,
    /// Target network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// Requested or granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<Scope>>,
    /// Requester metadata (permission requests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<AppMetadata>,
    /// Granted account key (permission responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Account the request acts on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Resulting transaction hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Resulting signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Failure reason (`Error` messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    /// Fields carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DomainMessage {
    /// Create a bare message of the given kind
    pub fn new(
        id: impl Into<String>,
        message_type: MessageType,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            message_type,
            version: PROTOCOL_VERSION.to_string(),
            sender_id: sender_id.into(),
            network: None,
            scopes: None,
            app_metadata: None,
            public_key: None,
            source_address: None,
            transaction_hash: None,
            signature: None,
            error_type: None,
            extra: Map::new(),
        }
    }

    /// Whether this message starts an exchange
    pub fn is_request(&self) -> bool {
        self.message_type.is_request()
    }

    /// Sender id usable for peer matching
    ///
    /// Legacy (version "1") messages never match a peer.
    pub fn routable_sender_id(&self) -> Option<&str> {
        if self.version == LEGACY_VERSION {
            None
        } else {
            Some(self.sender_id.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_pairs() {
        assert!(MessageType::PermissionRequest.is_request());
        assert!(!MessageType::PermissionResponse.is_request());
        assert!(!MessageType::Disconnect.is_request());
        assert_eq!(
            MessageType::SignPayloadRequest.response_type(),
            Some(MessageType::SignPayloadResponse)
        );
        assert_eq!(MessageType::Error.response_type(), None);
    }

    #[test]
    fn test_network_accepts_bare_string() {
        let network: Network = serde_json::from_value(json!("mainnet")).unwrap();
        assert_eq!(network, Network::mainnet());

        let custom: Network = serde_json::from_value(json!({
            "type": "custom",
            "name": "local",
            "rpcUrl": "http://localhost:8732"
        }))
        .unwrap();
        assert_eq!(custom.network_type, NetworkType::Custom);
        assert_eq!(custom.rpc_url.as_deref(), Some("http://localhost:8732"));

        // Serializes as the full object
        assert_eq!(serde_json::to_value(Network::mainnet()).unwrap(), json!({"type": "mainnet"}));
    }

    #[test]
    fn test_domain_message_wire_shape() {
        let raw = json!({
            "id": "r1",
            "type": "PermissionRequest",
            "version": "2",
            "senderId": "dapp1",
            "network": {"type": "mainnet"},
            "scopes": ["read_address", "sign"],
            "appMetadata": {"senderId": "dapp1", "name": "Example Dapp"},
            "operationDetails": [{"kind": "transaction"}]
        });

        let message: DomainMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(message.message_type, MessageType::PermissionRequest);
        assert_eq!(message.sender_id, "dapp1");
        assert_eq!(message.scopes, Some(vec![Scope::ReadAddress, Scope::Sign]));
        assert!(message.extra.contains_key("operationDetails"));

        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["senderId"], "dapp1");
        assert_eq!(back["operationDetails"][0]["kind"], "transaction");
        assert!(back.get("publicKey").is_none());
    }

    #[test]
    fn test_legacy_version_has_no_routable_sender() {
        let mut message = DomainMessage::new("r1", MessageType::OperationRequest, "dapp1");
        assert_eq!(message.routable_sender_id(), Some("dapp1"));

        message.version = LEGACY_VERSION.to_string();
        assert_eq!(message.routable_sender_id(), None);
    }

    #[test]
    fn test_error_type_wire_names() {
        assert_eq!(serde_json::to_value(ErrorType::Aborted).unwrap(), json!("ABORTED_ERROR"));
        assert_eq!(
            serde_json::to_value(ErrorType::NotGranted).unwrap(),
            json!("NOT_GRANTED_ERROR")
        );
    }
}

//! Stdio protocol.
//!
//! One JSON object per line in each direction, tagged by `type`.

use pairlink_core::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which pairing transport a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportName {
    /// Peers are requesters (dapps)
    Requesters,
    /// Peers are remote signing wallets
    RemoteWallets,
}

impl TransportName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportName::Requesters => "requesters",
            TransportName::RemoteWallets => "remote_wallets",
        }
    }
}

/// A peer announced by the embedder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairPeer {
    /// Hex ed25519 public key
    pub public_key: String,
    /// Display name
    pub name: String,
    /// Account address of a remote wallet; derived from the key when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// ── Embedder → Host ───────────────────────────────────────────────────────────

/// Lines read from stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostInput {
    /// An envelope from a page or the popup.
    /// Replies come back as `reply` lines carrying the same context id.
    Envelope { context_id: String, envelope: Envelope },

    /// An encoded message received from a paired peer.
    PeerMessage {
        transport: TransportName,
        from: String,
        message: String,
    },

    /// Pair a peer on one of the transports.
    Pair { transport: TransportName, peer: PairPeer },

    /// A page opened with a handshake in its URL.
    Handshake { context_id: String, url: String },

    /// The popup window opened or closed.
    Popup { open: bool },

    /// The page or popup behind a context went away.
    Close { context_id: String },
}

// ── Host → Embedder ───────────────────────────────────────────────────────────

/// Lines written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostOutput {
    /// A reply for the context that sent an envelope.
    Reply { context_id: String, data: Value },

    /// An encoded message for a paired peer.
    Peer {
        transport: TransportName,
        to: String,
        message: String,
    },

    /// An envelope for the popup UI.
    Popup { envelope: Envelope },

    /// A line could not be handled.
    Error { message: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

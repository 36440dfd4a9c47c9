//! # Peer Management
//!
//! Descriptor for a peer paired over a transport.

use serde::{Deserialize, Serialize};

use crate::account::sender_id_from_public_key;
use crate::error::Result;

/// State of a peer session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// Paired but not heard from since
    #[default]
    Paired,
    /// Has sent a message since pairing
    Active,
}

/// A paired peer, identified by its static public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDescriptor {
    /// Hex ed25519 public key
    pub public_key: String,
    /// Sender id derived from the public key
    pub sender_id: String,
    /// Display name announced at pairing
    pub name: String,
    /// Relay server the peer is reachable through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_server: Option<String>,
    /// Protocol version announced at pairing
    pub version: String,
    /// When the peer first paired (millis)
    pub paired_at: i64,
    /// Last activity (millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    /// Session state
    #[serde(default)]
    pub state: PeerState,
}

impl PeerDescriptor {
    /// Create a descriptor for a freshly paired peer
    ///
    /// Fails with `InvalidKey` if `public_key` is not an ed25519 key.
    pub fn paired(public_key: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let public_key = public_key.into();
        let sender_id = sender_id_from_public_key(&public_key)?;
        Ok(Self {
            public_key,
            sender_id,
            name: name.into(),
            relay_server: None,
            version: crate::message::PROTOCOL_VERSION.to_string(),
            paired_at: crate::time::now_timestamp_millis(),
            last_seen: None,
            state: PeerState::Paired,
        })
    }

    /// Fold a re-pairing of the same key into this entry
    ///
    /// Identity fields (`senderId`, `pairedAt`) are kept.
    pub fn merge(&mut self, update: PeerDescriptor) {
        self.name = update.name;
        self.relay_server = update.relay_server.or(self.relay_server.take());
        self.version = update.version;
        self.state = PeerState::Paired;
    }

    /// Update the last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Some(crate::time::now_timestamp_millis());
        self.state = PeerState::Active;
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Transport Events
//!
//! Events a transport broadcasts to every subscribed listener.

use super::PeerDescriptor;

/// Events emitted by a pairing transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport finished connecting
    Connected {
        /// Peers known at connect time
        peer_count: usize,
    },

    /// A peer paired, or re-paired with an existing key
    PeerPaired {
        /// The stored descriptor after the upsert
        peer: PeerDescriptor,
    },

    /// A peer was removed
    PeerRemoved {
        /// The removed peer's key
        public_key: String,
    },

    /// We received a message from a peer
    MessageReceived {
        /// Sender's public key
        from: String,
        /// Encoded message, one string per message
        message: String,
    },
}

impl TransportEvent {
    /// Check if this is a message event
    pub fn is_message_event(&self) -> bool {
        matches!(self, TransportEvent::MessageReceived { .. })
    }

    /// Check if this changes the peer list
    pub fn is_peer_event(&self) -> bool {
        matches!(
            self,
            TransportEvent::PeerPaired { .. } | TransportEvent::PeerRemoved { .. }
        )
    }
}

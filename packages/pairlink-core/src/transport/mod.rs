//! # Pairing Transport
//!
//! Multiplexes sessions with paired peers. A transport moves opaque encoded
//! strings; it never looks inside them.
//!
//! ## Transport Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PAIRING TRANSPORT                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   connect() ──► load persisted peers ──► Connected event               │
//! │                                                                         │
//! │   add_peer(p) ──► upsert by public key ──► PeerPaired event            │
//! │                                                                         │
//! │   send(encoded)            ──► every paired peer                        │
//! │   send_to_peer(key, enc)   ──► exactly one peer                         │
//! │        │                                                                │
//! │        └─ not connected / no peers ──► TransportNotReady                │
//! │                                                                         │
//! │   inbound string ──► MessageReceived ──► every subscriber               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The background context runs two transports behind this trait: one whose
//! peers are requesters, and one whose peers are remote signing wallets.

mod channel;
mod events;
mod peer;

pub use channel::{ChannelTransport, OutboundFrame};
pub use events::TransportEvent;
pub use peer::{PeerDescriptor, PeerState};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Name used in logs
    pub name: String,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: "transport".to_string(),
            event_capacity: 256,
        }
    }
}

/// Session multiplexer for paired peers
#[async_trait]
pub trait PairingTransport: Send + Sync {
    /// Establish the transport; sends before this fail with `TransportNotReady`
    async fn connect(&self) -> Result<()>;

    /// Whether `connect` has completed
    fn is_connected(&self) -> bool;

    /// Known peers
    async fn peers(&self) -> Result<Vec<PeerDescriptor>>;

    /// Pair a peer, or update the entry for an already-paired key
    async fn add_peer(&self, peer: PeerDescriptor) -> Result<PeerDescriptor>;

    /// Forget a peer; returns whether it was known
    async fn remove_peer(&self, public_key: &str) -> Result<bool>;

    /// Send to every paired peer
    async fn send(&self, encoded: &str) -> Result<()>;

    /// Send to one peer
    async fn send_to_peer(&self, public_key: &str, encoded: &str) -> Result<()>;

    /// Register a listener; every subscriber sees every event
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

//! Channel-backed [`PairingTransport`].
//!
//! Outbound traffic is handed to whatever owns the [`OutboundFrame`]
//! receiver (the host process, or a test). Inbound traffic enters through
//! [`ChannelTransport::deliver`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};

use super::{PairingTransport, PeerDescriptor, TransportConfig, TransportEvent};
use crate::account::sender_id_from_public_key;
use crate::error::{Error, Result};
use crate::storage::{StorageKey, TypedStore};

/// One encoded message addressed to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Recipient public key
    pub to: String,
    /// Encoded message
    pub message: String,
}

/// Transport whose wire is a pair of channels
pub struct ChannelTransport {
    config: TransportConfig,
    /// Paired peers
    peers: Arc<RwLock<Vec<PeerDescriptor>>>,
    /// Has connect() completed?
    connected: Arc<RwLock<bool>>,
    /// Outbound frames
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    /// Event broadcaster for subscribers
    event_tx: broadcast::Sender<TransportEvent>,
    /// Where peers are persisted
    persistence: Option<(TypedStore, StorageKey)>,
}

impl ChannelTransport {
    /// Create a transport and the receiver for its outbound frames
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let transport = Self {
            config,
            peers: Arc::new(RwLock::new(Vec::new())),
            connected: Arc::new(RwLock::new(false)),
            outbound_tx,
            event_tx,
            persistence: None,
        };

        (transport, outbound_rx)
    }

    /// Persist peers under `key`, reloading them on connect
    pub fn with_persistence(mut self, store: TypedStore, key: StorageKey) -> Self {
        self.persistence = Some((store, key));
        self
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Accept an inbound message from a paired peer
    pub fn deliver(&self, from: &str, message: impl Into<String>) -> Result<()> {
        {
            let mut peers = self.peers.write();
            let peer = peers
                .iter_mut()
                .find(|p| p.public_key == from)
                .ok_or_else(|| Error::PeerNotFound(from.to_string()))?;
            peer.touch();
        }

        let event = TransportEvent::MessageReceived {
            from: from.to_string(),
            message: message.into(),
        };
        if self.event_tx.send(event).is_err() {
            tracing::debug!(transport = self.name(), "No listeners for inbound message");
        }
        Ok(())
    }

    fn emit(&self, event: TransportEvent) {
        // Ignoring send errors: no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn persist(&self) -> Result<()> {
        if let Some((store, key)) = &self.persistence {
            let snapshot = self.peers.read().clone();
            store.set(*key, &snapshot).await?;
        }
        Ok(())
    }

    /// Insert or merge by public key. The sender id is always re-derived
    /// from the key; the caller's value is never trusted.
    fn upsert(&self, mut peer: PeerDescriptor) -> Result<PeerDescriptor> {
        peer.sender_id = sender_id_from_public_key(&peer.public_key)?;

        let mut peers = self.peers.write();
        match peers.iter_mut().find(|p| p.public_key == peer.public_key) {
            Some(existing) => {
                existing.merge(peer);
                Ok(existing.clone())
            }
            None => {
                peers.push(peer.clone());
                Ok(peer)
            }
        }
    }

    fn frame(&self, to: &str, encoded: &str) -> Result<()> {
        self.outbound_tx
            .send(OutboundFrame {
                to: to.to_string(),
                message: encoded.to_string(),
            })
            .map_err(|_| Error::TransportNotReady(format!("{}: outbound channel closed", self.name())))
    }

    fn ensure_connected(&self) -> Result<()> {
        if *self.connected.read() {
            Ok(())
        } else {
            Err(Error::TransportNotReady(format!("{}: not connected", self.name())))
        }
    }
}

#[async_trait]
impl PairingTransport for ChannelTransport {
    async fn connect(&self) -> Result<()> {
        if let Some((store, key)) = &self.persistence {
            let stored: Vec<PeerDescriptor> = store.get(*key).await?;
            for peer in stored {
                if let Err(e) = self.upsert(peer) {
                    tracing::warn!(transport = self.name(), error = %e, "Skipping stored peer");
                }
            }
        }

        *self.connected.write() = true;
        let peer_count = self.peers.read().len();
        tracing::info!(transport = self.name(), peer_count, "Transport connected");
        self.emit(TransportEvent::Connected { peer_count });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    async fn peers(&self) -> Result<Vec<PeerDescriptor>> {
        Ok(self.peers.read().clone())
    }

    async fn add_peer(&self, peer: PeerDescriptor) -> Result<PeerDescriptor> {
        let stored = self.upsert(peer)?;
        self.persist().await?;

        tracing::info!(
            transport = self.name(),
            sender_id = stored.sender_id.as_str(),
            name = stored.name.as_str(),
            "Peer paired"
        );
        self.emit(TransportEvent::PeerPaired {
            peer: stored.clone(),
        });
        Ok(stored)
    }

    async fn remove_peer(&self, public_key: &str) -> Result<bool> {
        let removed = {
            let mut peers = self.peers.write();
            let before = peers.len();
            peers.retain(|p| p.public_key != public_key);
            peers.len() != before
        };

        if removed {
            self.persist().await?;
            tracing::info!(transport = self.name(), public_key, "Peer removed");
            self.emit(TransportEvent::PeerRemoved {
                public_key: public_key.to_string(),
            });
        }
        Ok(removed)
    }

    async fn send(&self, encoded: &str) -> Result<()> {
        self.ensure_connected()?;

        let recipients: Vec<String> = self
            .peers
            .read()
            .iter()
            .map(|p| p.public_key.clone())
            .collect();
        if recipients.is_empty() {
            return Err(Error::TransportNotReady(format!(
                "{}: no paired peers",
                self.name()
            )));
        }

        for to in &recipients {
            self.frame(to, encoded)?;
        }
        tracing::debug!(transport = self.name(), recipients = recipients.len(), "Broadcast sent");
        Ok(())
    }

    async fn send_to_peer(&self, public_key: &str, encoded: &str) -> Result<()> {
        self.ensure_connected()?;

        let known = self.peers.read().iter().any(|p| p.public_key == public_key);
        if !known {
            return Err(Error::PeerNotFound(public_key.to_string()));
        }

        self.frame(public_key, encoded)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }
}

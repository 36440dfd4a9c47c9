//! # Popup Relay
//!
//! Hands envelopes to the transient popup UI.
//!
//! ```text
//! send_to_popup(env)          send_to_active_popup(env)
//!        │                              │
//!   is_open? ──no──► open()        is_open? ──no──► (nothing)
//!        │                              │
//!        ▼                              ▼
//!     post(env)                      post(env)
//! ```
//!
//! Both calls are best-effort: failures are logged, never returned.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{DomainMessage, Envelope, UserDecision};
use crate::transport::PeerDescriptor;

/// Events the background context shows in the popup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PopupEvent {
    /// A request waiting for a user decision
    Request {
        /// The request
        message: DomainMessage,
    },
    /// A remote wallet finished pairing
    Paired {
        /// The paired peer
        peer: PeerDescriptor,
    },
}

/// The UI surface the relay drives
#[async_trait]
pub trait PopupSurface: Send + Sync {
    /// Whether the popup is currently open
    fn is_open(&self) -> bool;

    /// Open or focus the popup
    async fn open(&self) -> Result<()>;

    /// Deliver an envelope to the open popup
    async fn post(&self, envelope: Envelope) -> Result<()>;
}

/// Presents a request to the user and waits for the decision
///
/// `None` means the user dismissed the prompt.
#[async_trait]
pub trait DecisionPrompt: Send + Sync {
    /// Show `request` and return the user's decision
    async fn present(&self, request: &DomainMessage) -> Result<Option<UserDecision>>;
}

/// Best-effort forwarding to the popup
#[derive(Clone)]
pub struct PopupRelay {
    surface: Arc<dyn PopupSurface>,
}

impl PopupRelay {
    /// Relay over `surface`
    pub fn new(surface: Arc<dyn PopupSurface>) -> Self {
        Self { surface }
    }

    /// Open the popup if needed, then deliver
    pub async fn send_to_popup(&self, envelope: Envelope) {
        if !self.surface.is_open() {
            if let Err(e) = self.surface.open().await {
                tracing::warn!(error = %e, "Failed to open popup");
                return;
            }
        }

        if let Err(e) = self.surface.post(envelope).await {
            tracing::warn!(error = %e, "Failed to post to popup");
        }
    }

    /// Deliver only if a popup is already open
    pub async fn send_to_active_popup(&self, envelope: Envelope) {
        if !self.surface.is_open() {
            tracing::debug!("No active popup, dropping envelope");
            return;
        }

        if let Err(e) = self.surface.post(envelope).await {
            tracing::warn!(error = %e, "Failed to post to active popup");
        }
    }

    /// Whether the popup is currently open
    pub fn is_open(&self) -> bool {
        self.surface.is_open()
    }
}

/// Popup surface whose UI lives on the other end of a channel
pub struct ChannelPopup {
    open: RwLock<bool>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPopup {
    /// Create a closed popup and the inbox its UI reads from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let popup = Self {
            open: RwLock::new(false),
            tx,
        };
        (popup, rx)
    }

    /// Mark the popup closed (the user dismissed the window)
    pub fn close(&self) {
        *self.open.write() = false;
    }
}

#[async_trait]
impl PopupSurface for ChannelPopup {
    fn is_open(&self) -> bool {
        *self.open.read() && !self.tx.is_closed()
    }

    async fn open(&self) -> Result<()> {
        if self.tx.is_closed() {
            return Err(Error::PopupUnavailable("popup inbox closed".into()));
        }
        *self.open.write() = true;
        tracing::debug!("Popup opened");
        Ok(())
    }

    async fn post(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| Error::PopupUnavailable("popup inbox closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Target;
    use serde_json::json;

    fn envelope(n: u32) -> Envelope {
        Envelope::new(Target::Extension, "background", json!({ "n": n })).unwrap()
    }

    #[tokio::test]
    async fn test_send_to_popup_opens_first() {
        let (popup, mut inbox) = ChannelPopup::new();
        let popup = Arc::new(popup);
        let relay = PopupRelay::new(popup.clone());

        assert!(!relay.is_open());
        relay.send_to_popup(envelope(1)).await;

        assert!(relay.is_open());
        assert_eq!(inbox.recv().await.unwrap().payload["n"], 1);
    }

    #[tokio::test]
    async fn test_send_to_active_popup_is_noop_when_closed() {
        let (popup, mut inbox) = ChannelPopup::new();
        let popup = Arc::new(popup);
        let relay = PopupRelay::new(popup.clone());

        relay.send_to_active_popup(envelope(1)).await;
        assert!(inbox.try_recv().is_err());
        assert!(!relay.is_open());

        relay.send_to_popup(envelope(2)).await;
        relay.send_to_active_popup(envelope(3)).await;
        assert_eq!(inbox.recv().await.unwrap().payload["n"], 2);
        assert_eq!(inbox.recv().await.unwrap().payload["n"], 3);

        popup.close();
        relay.send_to_active_popup(envelope(4)).await;
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_inbox_is_swallowed() {
        let (popup, inbox) = ChannelPopup::new();
        drop(inbox);
        let relay = PopupRelay::new(Arc::new(popup));

        // Must not panic or block
        relay.send_to_popup(envelope(1)).await;
        assert!(!relay.is_open());
    }

    #[test]
    fn test_popup_event_wire_shape() {
        let event = PopupEvent::Request {
            message: DomainMessage::new("r1", crate::message::MessageType::PermissionRequest, "dapp1"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "request");
        assert_eq!(value["message"]["id"], "r1");
    }
}

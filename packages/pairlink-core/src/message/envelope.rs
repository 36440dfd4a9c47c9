//! Envelopes, connection contexts and reply channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::DomainMessage;
use crate::error::Result;

/// Context an envelope is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The foreground page (protocol traffic)
    Page,
    /// The background context (actions)
    Background,
    /// The popup UI
    Extension,
    /// Anything else; routed to a no-op
    #[serde(other)]
    Unknown,
}

impl Target {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Page => "page",
            Target::Background => "background",
            Target::Extension => "extension",
            Target::Unknown => "unknown",
        }
    }
}

/// Unit of cross-context traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Where this is going
    pub target: Target,
    /// Identifier of the sending context
    pub sender: String,
    /// Target-specific body
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope from any serializable payload
    pub fn new(target: Target, sender: impl Into<String>, payload: impl Serialize) -> Result<Self> {
        Ok(Self {
            target,
            sender: sender.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Page envelope carrying an already-decoded message
    pub fn page_message(sender: impl Into<String>, message: &DomainMessage) -> Result<Self> {
        Self::new(Target::Page, sender, message)
    }
}

/// Body of a PAGE envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PagePayload {
    /// Codec output
    Encoded(String),
    /// Already decoded
    Message(Box<DomainMessage>),
}

// ============================================================================
// CONNECTION CONTEXT
// ============================================================================

/// Where a connection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A page/tab talking to the extension directly
    Page,
    /// The popup UI
    Popup,
    /// A paired requester on the requester transport
    Requester,
    /// A paired remote wallet on the remote-wallet transport
    RemoteWallet,
    /// The embedding host process
    Host,
}

/// Per-channel context recorded with each pending request
///
/// `id` identifies the website or peer the request came from and becomes
/// `originId` of any permission granted in response.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Channel identifier
    pub id: String,
    /// Channel kind
    pub origin: Origin,
    /// Direct reply channel, if the sender is listening on one
    pub responder: Responder,
}

impl ConnectionContext {
    /// A context with no reply channel
    pub fn new(id: impl Into<String>, origin: Origin) -> Self {
        Self {
            id: id.into(),
            origin,
            responder: Responder::none(),
        }
    }

    /// Attach a reply channel
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = responder;
        self
    }
}

/// Reply callback back to the originating channel
///
/// A detached responder behaves like the identity no-op.
#[derive(Clone, Default)]
pub struct Responder {
    tx: Option<mpsc::UnboundedSender<Value>>,
}

impl Responder {
    /// A responder and the receiving end the sender listens on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// The no-op responder
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// Whether replies go anywhere
    pub fn is_attached(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Send a reply; returns whether it was handed to a live channel
    pub fn send(&self, value: Value) -> bool {
        match &self.tx {
            Some(tx) => {
                if tx.send(value).is_err() {
                    tracing::debug!("Reply channel closed, dropping response");
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("attached", &self.is_attached())
            .finish()
    }
}

//! PAGE target: protocol requests and responses.
//!
//! ```text
//! decoded message
//!   │
//!   ├── response, from requester ──────────► InvalidEnvelope
//!   ├── response, otherwise ───────────────► send_to_page (no persistence)
//!   │
//!   ├── request, remote wallet active ─────► record ─► forward to remote
//!   │
//!   └── request, local
//!         ├── PermissionRequest ───────────► store app metadata ─► record ─► popup
//!         ├── Operation / SignPayload ─────► scope check ─┬─ ok ──► record ─► popup
//!         │                                               └─ no ──► Error{NOT_GRANTED}
//!         └── BroadcastRequest ────────────► record ─► popup
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{DispatchContext, MessageHandler};
use crate::client::BridgeClient;
use crate::error::{Error, Result};
use crate::message::{
    error_response, ConnectionContext, DomainMessage, Envelope, ErrorType, MessageType, Origin,
    PagePayload,
};

/// Handler for envelopes addressed to the page
pub struct PageHandler {
    client: Arc<BridgeClient>,
}

impl PageHandler {
    /// Handler over `client`
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }

    fn decode(&self, payload: &Value) -> Result<DomainMessage> {
        let payload: PagePayload = serde_json::from_value(payload.clone())
            .map_err(|e| Error::InvalidEnvelope(format!("page payload: {}", e)))?;

        match payload {
            PagePayload::Encoded(encoded) => self.client.codec().decode(&encoded),
            PagePayload::Message(message) => Ok(*message),
        }
    }

    async fn handle_request(&self, message: DomainMessage, ctx: &DispatchContext) -> Result<()> {
        let connection = ctx.connection.clone();

        if ctx.remote_connected {
            let id = message.id.clone();
            self.client.record_request(message.clone(), connection);
            if let Err(e) = self.client.forward_to_remote(&message).await {
                // Nobody will ever answer it
                let _ = self.client.ledger().take(&id);
                return Err(e);
            }
            return Ok(());
        }

        match message.message_type {
            MessageType::PermissionRequest => {
                if let Some(metadata) = &message.app_metadata {
                    self.client.registries().app_metadata.add(metadata.clone()).await?;
                }
                self.client.record_request(message.clone(), connection);
                self.client.present(message).await
            }
            MessageType::OperationRequest | MessageType::SignPayloadRequest => {
                self.handle_scoped(message, connection).await
            }
            MessageType::BroadcastRequest => {
                self.client.record_request(message.clone(), connection);
                self.client.present(message).await
            }
            other => Err(Error::InvalidEnvelope(format!("{:?} is not a request", other))),
        }
    }

    /// `Err(NotGranted)` unless the sender holds a grant with the scope the
    /// request needs, for the address it names
    async fn check_scope(&self, message: &DomainMessage) -> Result<()> {
        let Some(scope) = message.message_type.required_scope() else {
            return Ok(());
        };

        let granted = self
            .client
            .registries()
            .permissions
            .for_sender(&message.sender_id)
            .await?
            .iter()
            .any(|permission| {
                permission.allows(scope)
                    && message
                        .source_address
                        .as_ref()
                        .map_or(true, |address| &permission.address == address)
            });

        if granted {
            Ok(())
        } else {
            Err(Error::NotGranted(format!(
                "{} lacks {:?} for {}",
                message.sender_id, scope, message.id
            )))
        }
    }

    /// Requests that need a prior grant with the matching scope
    async fn handle_scoped(&self, message: DomainMessage, connection: ConnectionContext) -> Result<()> {
        match self.check_scope(&message).await {
            Ok(()) => {
                self.client.record_request(message.clone(), connection);
                self.client.present(message).await
            }
            Err(Error::NotGranted(reason)) => {
                tracing::warn!(
                    id = message.id.as_str(),
                    kind = ?message.message_type,
                    "{}",
                    reason
                );
                let response = error_response(
                    &message,
                    ErrorType::NotGranted,
                    &self.client.config().sender_id,
                );
                self.client.record_request(message.clone(), connection);
                if let Err(e) = self.client.send_to_page(response, false).await {
                    // Nobody will ever answer it
                    let _ = self.client.ledger().take(&message.id);
                    return Err(e);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_disconnect(&self, message: &DomainMessage, ctx: &DispatchContext) -> Result<()> {
        if ctx.connection.origin != Origin::Requester {
            tracing::debug!(sender_id = message.sender_id.as_str(), "Disconnect from non-peer ignored");
            return Ok(());
        }

        let removed = self.client.requesters().remove_peer(&ctx.connection.id).await?;
        tracing::info!(
            public_key = ctx.connection.id.as_str(),
            removed,
            "Requester disconnected"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for PageHandler {
    async fn handle(&self, envelope: &Envelope, ctx: &DispatchContext) -> Result<()> {
        let message = self.decode(&envelope.payload)?;
        tracing::debug!(
            id = message.id.as_str(),
            kind = ?message.message_type,
            context_id = ctx.connection.id.as_str(),
            remote_connected = ctx.remote_connected,
            "Page message"
        );

        if message.is_request() {
            return self.handle_request(message, ctx).await;
        }

        if message.message_type == MessageType::Disconnect {
            return self.handle_disconnect(&message, ctx).await;
        }

        if ctx.connection.origin == Origin::Requester {
            tracing::warn!(
                id = message.id.as_str(),
                kind = ?message.message_type,
                public_key = ctx.connection.id.as_str(),
                "Response from requester rejected"
            );
            return Err(Error::InvalidEnvelope(format!(
                "{:?} from requester {}",
                message.message_type, ctx.connection.id
            )));
        }

        self.client.send_to_page(message, false).await.map(|_| ())
    }
}

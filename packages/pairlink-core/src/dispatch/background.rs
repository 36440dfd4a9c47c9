//! BACKGROUND target: actions from the popup and pages.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DispatchContext, MessageHandler};
use crate::actions::{self, parse_action, send_error};
use crate::client::BridgeClient;
use crate::error::{Error, Result};
use crate::message::Envelope;

/// Handler for envelopes addressed to the background context
pub struct BackgroundHandler {
    client: Arc<BridgeClient>,
}

impl BackgroundHandler {
    /// Handler over `client`
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageHandler for BackgroundHandler {
    async fn handle(&self, envelope: &Envelope, ctx: &DispatchContext) -> Result<()> {
        let responder = &ctx.connection.responder;
        let name = envelope
            .payload
            .get("action")
            .and_then(|action| action.as_str())
            .unwrap_or("unknown")
            .to_string();

        let action = match parse_action(&envelope.payload) {
            Ok(action) => action,
            Err(e @ Error::UnknownAction(_)) => {
                tracing::warn!(action = name.as_str(), sender = envelope.sender.as_str(), "Unknown action");
                send_error(responder, &name, &e);
                return Ok(());
            }
            Err(e) => {
                send_error(responder, &name, &e);
                return Err(e);
            }
        };

        if let Err(e) = actions::run(action, responder.clone(), self.client.clone()).await {
            send_error(responder, &name, &e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::Harness;
    use crate::dispatch::Dispatcher;
    use crate::message::{ConnectionContext, Origin, Responder, Target};
    use serde_json::json;

    #[tokio::test]
    async fn test_action_reply_goes_to_origin() {
        let h = Harness::new().await;
        let dispatcher = Dispatcher::standard(h.client.clone());
        let (responder, mut replies) = Responder::channel();
        let ctx = DispatchContext::new(
            ConnectionContext::new("popup", Origin::Popup).with_responder(responder),
            false,
        );

        let envelope = Envelope::new(Target::Background, "popup", json!({ "action": "wallets_get" })).unwrap();
        assert!(dispatcher.route(&envelope, &ctx).await.is_clean());

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply, json!({ "action": "wallets_get", "data": { "wallets": [] } }));
    }

    #[tokio::test]
    async fn test_unknown_action_replies_error_and_succeeds() {
        let h = Harness::new().await;
        let dispatcher = Dispatcher::standard(h.client.clone());
        let (responder, mut replies) = Responder::channel();
        let ctx = DispatchContext::new(
            ConnectionContext::new("popup", Origin::Popup).with_responder(responder),
            false,
        );

        let envelope = Envelope::new(Target::Background, "popup", json!({ "action": "self_destruct" })).unwrap();
        let report = dispatcher.route(&envelope, &ctx).await;
        assert!(report.is_clean());

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply["action"], "self_destruct");
        assert_eq!(reply["error"]["code"], 201);
        assert_eq!(reply["error"]["recoverable"], false);
    }

    #[tokio::test]
    async fn test_failed_action_replies_error() {
        let h = Harness::new().await;
        let dispatcher = Dispatcher::standard(h.client.clone());
        let (responder, mut replies) = Responder::channel();
        let ctx = DispatchContext::new(
            ConnectionContext::new("popup", Origin::Popup).with_responder(responder),
            false,
        );

        let envelope = Envelope::new(
            Target::Background,
            "popup",
            json!({
                "action": "response",
                "data": {
                    "request": { "id": "ghost", "type": "BroadcastRequest", "version": "2", "senderId": "dapp1" },
                    "decision": { "kind": "broadcasted", "transactionHash": "oo1" }
                }
            }),
        )
        .unwrap();
        let report = dispatcher.route(&envelope, &ctx).await;
        assert!(matches!(report.handler_error, Some(Error::RequestNotFound(_))));

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply["action"], "response");
        assert_eq!(reply["error"]["code"], 200);
    }

    #[tokio::test]
    async fn test_action_shaped_page_payload_never_reaches_background() {
        let h = Harness::new().await;
        let dispatcher = Dispatcher::standard(h.client.clone());
        let (responder, mut replies) = Responder::channel();
        let ctx = DispatchContext::new(
            ConnectionContext::new("tab", Origin::Page).with_responder(responder),
            false,
        );

        let envelope = Envelope::new(Target::Page, "tab", json!({ "action": "wallets_get" })).unwrap();
        let report = dispatcher.route(&envelope, &ctx).await;

        assert!(matches!(report.handler_error, Some(Error::InvalidEnvelope(_))));
        assert!(replies.try_recv().is_err());
    }
}

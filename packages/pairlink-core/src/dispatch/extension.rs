//! EXTENSION target: forwarded to the popup, if one is open.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DispatchContext, MessageHandler};
use crate::client::BridgeClient;
use crate::error::Result;
use crate::message::Envelope;

/// Handler for envelopes addressed to the popup
pub struct ExtensionHandler {
    client: Arc<BridgeClient>,
}

impl ExtensionHandler {
    /// Handler over `client`
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageHandler for ExtensionHandler {
    async fn handle(&self, envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
        self.client.popup().send_to_active_popup(envelope.clone()).await;
        Ok(())
    }
}

//! Handshake and the active-network pointer.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use super::{Action, ActionContext, ActionKind};
use crate::error::Result;

pub(super) fn handshake(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let config = ctx.client.config();
        ctx.reply(json!({
            "name": config.name,
            "senderId": config.sender_id,
            "version": config.protocol_version,
        }))
    }
    .boxed()
}

pub(super) fn active_network_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let network = ctx.client.registries().wallets.active_network().await?;
        ctx.reply(json!({ "network": network }))
    }
    .boxed()
}

pub(super) fn active_network_set(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::ActiveNetworkSet { network } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::ActiveNetworkSet));
        };
        ctx.client.registries().wallets.set_active_network(network).await?;
        tracing::info!(network = network.network_type.as_str(), "Active network changed");
        ctx.reply(json!({ "network": network }))
    }
    .boxed()
}

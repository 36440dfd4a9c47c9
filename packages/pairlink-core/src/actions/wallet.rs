//! Wallet CRUD and the active-wallet pointer.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use super::{Action, ActionContext, ActionKind};
use crate::error::Result;

pub(super) fn wallets_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let wallets = ctx.client.registries().wallets.list().await?;
        ctx.reply(json!({ "wallets": wallets }))
    }
    .boxed()
}

pub(super) fn wallet_add(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::WalletAdd { wallet } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::WalletAdd));
        };
        let wallets = ctx.client.registries().wallets.add(wallet.clone()).await?;
        ctx.reply(json!({ "wallets": wallets }))
    }
    .boxed()
}

pub(super) fn wallet_delete(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::WalletDelete { wallet } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::WalletDelete));
        };
        let wallets = ctx.client.registries().wallets.remove(&wallet.pubkey).await?;
        ctx.reply(json!({ "wallets": wallets }))
    }
    .boxed()
}

pub(super) fn wallets_delete_all(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        ctx.client.registries().wallets.remove_all().await?;
        tracing::info!("All wallets removed");
        ctx.reply(json!({}))
    }
    .boxed()
}

pub(super) fn active_wallet_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let wallet = ctx.client.registries().wallets.active().await?;
        ctx.reply(json!({ "wallet": wallet }))
    }
    .boxed()
}

pub(super) fn active_wallet_set(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::ActiveWalletSet { wallet } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::ActiveWalletSet));
        };
        ctx.client.registries().wallets.set_active(wallet).await?;
        tracing::info!(
            pubkey = wallet.pubkey.as_str(),
            remote = wallet.is_remote(),
            "Active wallet changed"
        );
        ctx.reply(json!({ "wallet": wallet }))
    }
    .boxed()
}

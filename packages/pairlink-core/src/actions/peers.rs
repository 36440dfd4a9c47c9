//! Transport peers, remote pairing and the pending-request ledger.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use super::{Action, ActionContext, ActionKind};
use crate::account::address_from_public_key;
use crate::error::{Error, Result};
use crate::message::{Envelope, Target, BACKGROUND_SENDER};
use crate::popup::PopupEvent;
use crate::registry::WalletInfo;

pub(super) fn peers_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let requesters = ctx.client.requesters().peers().await?;
        let remote_wallets = ctx.client.remote_wallets().peers().await?;
        ctx.reply(json!({
            "requesters": requesters,
            "remoteWallets": remote_wallets,
        }))
    }
    .boxed()
}

pub(super) fn peer_remove(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::PeerRemove { public_key } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::PeerRemove));
        };

        let from_requesters = ctx.client.requesters().remove_peer(public_key).await?;
        let from_remote = ctx.client.remote_wallets().remove_peer(public_key).await?;

        // A remote wallet's pairing is its wallet entry
        if from_remote {
            ctx.client.registries().wallets.remove(public_key).await?;
        }

        tracing::info!(
            public_key = public_key.as_str(),
            from_requesters,
            from_remote,
            "Peer removed"
        );
        ctx.reply(json!({ "removed": from_requesters || from_remote }))
    }
    .boxed()
}

pub(super) fn remote_pair(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::RemotePair { peer, address } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::RemotePair));
        };

        let peer = ctx.client.remote_wallets().add_peer(peer.clone()).await?;
        let address = match address {
            Some(address) => address.clone(),
            None => address_from_public_key(&peer.public_key)?,
        };

        let wallets = &ctx.client.registries().wallets;
        wallets
            .add(WalletInfo::remote_pairing(peer.clone(), address))
            .await?;
        // add() is idempotent, so activate whatever is stored for this key
        let wallet = wallets
            .get_by_pubkey(&peer.public_key)
            .await?
            .ok_or_else(|| Error::StorageReadError("paired wallet vanished".into()))?;
        wallets.set_active(&wallet).await?;

        tracing::info!(
            public_key = peer.public_key.as_str(),
            name = peer.name.as_str(),
            "Remote wallet paired"
        );

        let event = Envelope::new(Target::Extension, BACKGROUND_SENDER, PopupEvent::Paired { peer })?;
        ctx.client.popup().send_to_active_popup(event).await;

        ctx.reply(json!({ "wallet": wallet }))
    }
    .boxed()
}

pub(super) fn pending_requests_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let requests = ctx.client.ledger().requests();
        ctx.reply(json!({ "requests": requests }))
    }
    .boxed()
}

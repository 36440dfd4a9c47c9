//! Permission and app-metadata stores.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use super::{Action, ActionContext, ActionKind};
use crate::error::Result;

pub(super) fn permissions_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let permissions = ctx.client.registries().permissions.list().await?;
        ctx.reply(json!({ "permissions": permissions }))
    }
    .boxed()
}

pub(super) fn permission_delete(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::PermissionDelete { account_identifier } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::PermissionDelete));
        };
        let permissions = ctx
            .client
            .registries()
            .permissions
            .remove(account_identifier)
            .await?;
        tracing::info!(account_identifier = account_identifier.as_str(), "Permission revoked");
        ctx.reply(json!({ "permissions": permissions }))
    }
    .boxed()
}

pub(super) fn permissions_delete_all(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        ctx.client.registries().permissions.remove_all().await?;
        tracing::info!("All permissions revoked");
        ctx.reply(json!({}))
    }
    .boxed()
}

pub(super) fn app_metadata_get(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let metadata = ctx.client.registries().app_metadata.list().await?;
        ctx.reply(json!({ "appMetadata": metadata }))
    }
    .boxed()
}

pub(super) fn app_metadata_delete(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::AppMetadataDelete { sender_id } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::AppMetadataDelete));
        };
        let metadata = ctx.client.registries().app_metadata.remove(sender_id).await?;
        ctx.reply(json!({ "appMetadata": metadata }))
    }
    .boxed()
}

pub(super) fn app_metadata_delete_all(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        ctx.client.registries().app_metadata.remove_all().await?;
        ctx.reply(json!({}))
    }
    .boxed()
}

//! Answering a pending request.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;

use super::{Action, ActionContext, ActionKind};
use crate::error::Result;

/// Build the response from the decision, persist a permission grant and
/// route the response to the requester.
pub(super) fn response(ctx: ActionContext) -> BoxFuture<'static, Result<()>> {
    async move {
        let Action::Response { request, decision } = &ctx.data else {
            return Err(ctx.unexpected(ActionKind::Response));
        };

        let delivered = ctx.client.respond(&request.id, decision.clone()).await?;
        ctx.reply(json!({ "delivered": delivered }))
    }
    .boxed()
}

//! Query-parameter handshake.
//!
//! A page can be opened with an initial pairing message in its URL, e.g.
//! `https://wallet.example/?d=<codec output>`. It is decoded once and routed
//! like any other inbound PAGE message.

use url::Url;

use crate::codec::Codec;
use crate::context::BackgroundHandle;
use crate::error::{Error, Result};
use crate::message::{ConnectionContext, DomainMessage, Envelope};

/// Query parameter carrying the handshake
pub const HANDSHAKE_PARAM: &str = "d";

/// Decode the handshake in `url`, if it carries one
pub fn extract_handshake(url: &str, codec: &dyn Codec) -> Result<Option<DomainMessage>> {
    let url = Url::parse(url).map_err(|e| Error::InvalidEnvelope(format!("bad url: {}", e)))?;

    let Some((_, encoded)) = url.query_pairs().find(|(key, _)| key == HANDSHAKE_PARAM) else {
        return Ok(None);
    };

    codec.decode(&encoded).map(Some)
}

/// Route the handshake in `url` to the background context
///
/// Returns whether a handshake was found.
pub async fn route_query_handshake(
    url: &str,
    codec: &dyn Codec,
    background: &BackgroundHandle,
    connection: ConnectionContext,
) -> Result<bool> {
    let Some(message) = extract_handshake(url, codec)? else {
        return Ok(false);
    };

    tracing::info!(
        id = message.id.as_str(),
        sender_id = message.sender_id.as_str(),
        context_id = connection.id.as_str(),
        "Handshake found in url"
    );

    let envelope = Envelope::page_message(connection.id.clone(), &message)?;
    background.post(envelope, connection).await?;
    Ok(true)
}

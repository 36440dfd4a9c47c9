//! Stdio handler.
//!
//! Reads `HostInput` lines, feeds them to the bridge, and writes every
//! `HostOutput` the bridge produces as a line on the output stream.

use pairlink_core::actions::Action;
use pairlink_core::handshake::route_query_handshake;
use pairlink_core::message::{ConnectionContext, Origin, POPUP_SENDER};
use pairlink_core::popup::PopupSurface;
use pairlink_core::transport::{OutboundFrame, PairingTransport, PeerDescriptor};
use pairlink_core::{Envelope, Error, Result, Target};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::{HostInput, HostOutput, PairPeer, TransportName};
use crate::state::HostState;

/// Sender id the host stamps on envelopes it builds itself.
const HOST_SENDER: &str = "host";

// ── Output ────────────────────────────────────────────────────────────────────

/// Serialize outputs as JSON lines until every sender is dropped.
pub fn spawn_writer<W>(mut rx: mpsc::UnboundedReceiver<HostOutput>, mut writer: W) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(output) = rx.recv().await {
            let mut line = match serde_json::to_string(&output) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("Failed to serialize output: {}", e);
                    continue;
                }
            };
            line.push('\n');

            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::error!("Failed to write output: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                tracing::error!("Failed to flush output: {}", e);
                break;
            }
        }
    })
}

/// Turn a transport's outbound frames into `peer` lines.
pub fn spawn_peer_forwarder(
    state: HostState,
    transport: TransportName,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let output = HostOutput::Peer {
                transport,
                to: frame.to,
                message: frame.message,
            };
            if !state.emit(output) {
                break;
            }
        }
    })
}

/// Turn popup inbox envelopes into `popup` lines.
pub fn spawn_popup_forwarder(
    state: HostState,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            if !state.emit(HostOutput::Popup { envelope }) {
                break;
            }
        }
    })
}

// ── Input ─────────────────────────────────────────────────────────────────────

/// Handle input lines until EOF. Returns the number of lines handled.
pub async fn run<R>(state: HostState, input: R) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        handle_line(&state, &line).await;
        handled += 1;
    }

    tracing::info!(lines = handled, "Input closed");
    handled
}

/// Parse and handle one line, reporting failures as `error` lines.
pub async fn handle_line(state: &HostState, line: &str) {
    let input: HostInput = match serde_json::from_str(line) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!("Invalid input line: {}", e);
            state.emit(HostOutput::Error {
                message: format!("Invalid message format: {}", e),
            });
            return;
        }
    };

    if let Err(e) = handle_input(state, input).await {
        tracing::warn!(code = e.code(), "Input failed: {}", e);
        state.emit(HostOutput::Error {
            message: e.to_string(),
        });
    }
}

async fn handle_input(state: &HostState, input: HostInput) -> Result<()> {
    match input {
        HostInput::Envelope {
            context_id,
            envelope,
        } => {
            let origin = match envelope.target {
                Target::Page => Origin::Page,
                _ if envelope.sender == POPUP_SENDER => Origin::Popup,
                _ => Origin::Host,
            };
            tracing::debug!(
                context_id = context_id.as_str(),
                to = envelope.target.as_str(),
                "Envelope from embedder"
            );

            let connection = ConnectionContext::new(context_id.clone(), origin)
                .with_responder(state.responder_for(&context_id));
            state.background.post(envelope, connection).await
        }

        HostInput::PeerMessage {
            transport,
            from,
            message,
        } => state.transport(transport).deliver(&from, message),

        HostInput::Pair { transport, peer } => pair(state, transport, peer).await,

        HostInput::Handshake { context_id, url } => {
            let connection = ConnectionContext::new(context_id.clone(), Origin::Page)
                .with_responder(state.responder_for(&context_id));
            let found =
                route_query_handshake(&url, state.client.codec(), &state.background, connection)
                    .await?;
            if !found {
                tracing::debug!(context_id = context_id.as_str(), "No handshake in url");
            }
            Ok(())
        }

        HostInput::Popup { open } => {
            if open {
                state.popup.open().await
            } else {
                state.popup.close();
                Ok(())
            }
        }

        HostInput::Close { context_id } => {
            if !state.close_context(&context_id) {
                tracing::debug!(context_id = context_id.as_str(), "Close for unknown context");
            }
            Ok(())
        }
    }
}

/// Requesters pair straight on the transport. Remote wallets go through the
/// `remote_pair` action so the wallet is registered and made active.
async fn pair(state: &HostState, transport: TransportName, peer: PairPeer) -> Result<()> {
    let descriptor = PeerDescriptor::paired(peer.public_key, peer.name)?;

    match transport {
        TransportName::Requesters => {
            let paired = state.requesters.add_peer(descriptor).await?;
            tracing::info!(
                sender_id = paired.sender_id.as_str(),
                name = paired.name.as_str(),
                "Requester paired"
            );
            Ok(())
        }
        TransportName::RemoteWallets => {
            let action = Action::RemotePair {
                peer: descriptor,
                address: peer.address,
            };
            let envelope = Envelope::new(Target::Background, HOST_SENDER, action)?;
            let context_id = format!("{}-{}", HOST_SENDER, Uuid::new_v4());

            let reply = state
                .background
                .request(envelope, context_id, Origin::Host)
                .await?;
            match reply.get("error") {
                Some(error) => Err(Error::Internal(format!(
                    "remote pairing failed: {}",
                    error["message"].as_str().unwrap_or("unknown error")
                ))),
                None => Ok(()),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHost;
    use pairlink_core::codec::Codec;
    use pairlink_core::message::{DomainMessage, MessageType};
    use serde_json::json;

    const KEY_A: &str = "5866666666666666666666666666666666666666666666666666666666666666";

    fn line(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[tokio::test]
    async fn test_invalid_line_reports_error() {
        let mut host = TestHost::start().await;
        handle_line(&host.state, "{not json").await;

        match host.next_output().await {
            HostOutput::Error { message } => assert!(message.starts_with("Invalid message format")),
            other => panic!("Wrong output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_reply_carries_context_id() {
        let mut host = TestHost::start().await;
        let input = line(json!({
            "type": "envelope",
            "contextId": "popup-1",
            "envelope": { "target": "background", "sender": "popup", "payload": { "action": "wallets_get" } }
        }));
        handle_line(&host.state, &input).await;

        match host.next_output().await {
            HostOutput::Reply { context_id, data } => {
                assert_eq!(context_id, "popup-1");
                assert_eq!(data, json!({ "action": "wallets_get", "data": { "wallets": [] } }));
            }
            other => panic!("Wrong output: {:?}", other),
        }
        assert_eq!(host.state.context_count(), 1);
    }

    #[tokio::test]
    async fn test_close_drops_reply_channel() {
        let mut host = TestHost::start().await;
        let envelope = line(json!({
            "type": "envelope",
            "contextId": "tab-1",
            "envelope": { "target": "background", "sender": "tab", "payload": { "action": "handshake" } }
        }));
        handle_line(&host.state, &envelope).await;
        assert!(matches!(host.next_output().await, HostOutput::Reply { .. }));
        assert_eq!(host.state.context_count(), 1);

        handle_line(&host.state, r#"{"type":"close","contextId":"tab-1"}"#).await;
        assert_eq!(host.state.context_count(), 0);

        // Unknown ids are ignored
        handle_line(&host.state, r#"{"type":"close","contextId":"tab-1"}"#).await;
        assert!(host.try_output().is_none());

        // A fresh envelope reopens the context
        handle_line(&host.state, &envelope).await;
        match host.next_output().await {
            HostOutput::Reply { context_id, .. } => assert_eq!(context_id, "tab-1"),
            other => panic!("Wrong output: {:?}", other),
        }
        assert_eq!(host.state.context_count(), 1);
    }

    #[tokio::test]
    async fn test_peer_message_from_unknown_peer_reports_error() {
        let mut host = TestHost::start().await;
        let input = line(json!({
            "type": "peer_message",
            "transport": "requesters",
            "from": KEY_A,
            "message": "abc"
        }));
        handle_line(&host.state, &input).await;

        match host.next_output().await {
            HostOutput::Error { message } => assert!(message.contains(KEY_A)),
            other => panic!("Wrong output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paired_requester_request_reaches_popup() {
        let mut host = TestHost::start().await;
        handle_line(
            &host.state,
            &line(json!({
                "type": "pair",
                "transport": "requesters",
                "peer": { "publicKey": KEY_A, "name": "dapp" }
            })),
        )
        .await;
        let peers = host.state.requesters.peers().await.unwrap();
        assert_eq!(peers.len(), 1);

        let request = DomainMessage::new("r1", MessageType::PermissionRequest, peers[0].sender_id.clone());
        let encoded = host.state.client.codec().encode(&request).unwrap();
        handle_line(
            &host.state,
            &line(json!({
                "type": "peer_message",
                "transport": "requesters",
                "from": KEY_A,
                "message": encoded
            })),
        )
        .await;

        match host.next_output().await {
            HostOutput::Popup { envelope } => {
                assert_eq!(envelope.target, Target::Extension);
                assert_eq!(envelope.payload["message"]["id"], "r1");
            }
            other => panic!("Wrong output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_pair_activates_wallet() {
        let mut host = TestHost::start().await;
        handle_line(
            &host.state,
            &line(json!({
                "type": "pair",
                "transport": "remote_wallets",
                "peer": { "publicKey": KEY_A, "name": "phone" }
            })),
        )
        .await;

        assert_eq!(host.state.remote_wallets.peers().await.unwrap().len(), 1);
        let active = host.state.client.registries().wallets.active().await.unwrap();
        assert_eq!(active.unwrap().pubkey, KEY_A);
        assert!(host.try_output().is_none());
    }

    #[tokio::test]
    async fn test_popup_open_and_close() {
        let host = TestHost::start().await;
        handle_line(&host.state, r#"{"type":"popup","open":true}"#).await;
        assert!(host.state.client.popup().is_open());

        handle_line(&host.state, r#"{"type":"popup","open":false}"#).await;
        assert!(!host.state.client.popup().is_open());
    }

    #[tokio::test]
    async fn test_run_counts_lines_until_eof() {
        let host = TestHost::start().await;
        let input = b"{\"type\":\"popup\",\"open\":true}\n\n{\"type\":\"popup\",\"open\":false}\n";
        let handled = run(host.state.clone(), &input[..]).await;
        assert_eq!(handled, 2);
    }

    #[tokio::test]
    async fn test_writer_emits_json_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = spawn_writer(rx, client);

        tx.send(HostOutput::Error {
            message: "boom".into(),
        })
        .unwrap();
        drop(tx);
        writer.await.unwrap();

        let mut buf = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, "{\"type\":\"error\",\"message\":\"boom\"}\n");
    }
}

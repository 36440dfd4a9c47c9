//! Host state.
//!
//! Holds the running bridge, the concrete transports and popup the host
//! drives, and one reply channel per embedder context.

use std::sync::Arc;

use dashmap::DashMap;
use pairlink_core::codec::Base58CheckCodec;
use pairlink_core::message::Responder;
use pairlink_core::popup::{ChannelPopup, PopupRelay};
use pairlink_core::storage::{Storage, StorageKey, TypedStore};
use pairlink_core::transport::{ChannelTransport, TransportConfig};
use pairlink_core::{BackgroundHandle, Bridge, BridgeClient, BridgeConfig, BridgeParts, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handler::{spawn_peer_forwarder, spawn_popup_forwarder};
use crate::protocol::{HostOutput, TransportName};

/// Sender half of the stdout writer.
pub type OutputSender = mpsc::UnboundedSender<HostOutput>;

/// Shared host state.
#[derive(Clone)]
pub struct HostState {
    /// Lines headed for stdout.
    pub out: OutputSender,

    /// Context id → responder whose replies become `reply` lines.
    /// Created on first use and dropped on `close`.
    pub contexts: Arc<DashMap<String, Responder>>,

    pub client: Arc<BridgeClient>,
    pub background: BackgroundHandle,
    pub requesters: Arc<ChannelTransport>,
    pub remote_wallets: Arc<ChannelTransport>,
    pub popup: Arc<ChannelPopup>,
}

impl HostState {
    /// Queue a line for stdout. Returns false once the writer is gone.
    pub fn emit(&self, output: HostOutput) -> bool {
        self.out.send(output).is_ok()
    }

    /// The responder for `context_id`, creating it and its forwarder on first use.
    pub fn responder_for(&self, context_id: &str) -> Responder {
        if let Some(existing) = self.contexts.get(context_id) {
            return existing.clone();
        }

        let entry = self.contexts.entry(context_id.to_string()).or_insert_with(|| {
            let (responder, mut replies) = Responder::channel();
            let out = self.out.clone();
            let id = context_id.to_string();

            tokio::spawn(async move {
                while let Some(data) = replies.recv().await {
                    let reply = HostOutput::Reply {
                        context_id: id.clone(),
                        data,
                    };
                    if out.send(reply).is_err() {
                        break;
                    }
                }
            });

            tracing::debug!(context_id = context_id, "Opened reply channel");
            responder
        });
        entry.clone()
    }

    /// Forget the responder for `context_id`. Its forwarder stops once the
    /// last pending request holding a clone is answered or swept.
    pub fn close_context(&self, context_id: &str) -> bool {
        let removed = self.contexts.remove(context_id).is_some();
        if removed {
            tracing::debug!(context_id = context_id, "Closed reply channel");
        }
        removed
    }

    pub fn transport(&self, name: TransportName) -> &Arc<ChannelTransport> {
        match name {
            TransportName::Requesters => &self.requesters,
            TransportName::RemoteWallets => &self.remote_wallets,
        }
    }

    /// Number of contexts with an open reply channel.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// A started host: the bridge plus the tasks that turn its output into lines.
pub struct Host {
    pub state: HostState,
    bridge: Bridge,
    forwarders: Vec<JoinHandle<()>>,
}

impl Host {
    /// Build the transports and popup, start the bridge, and forward
    /// everything it emits to `out`.
    pub async fn start(
        config: BridgeConfig,
        storage: Arc<dyn Storage>,
        out: OutputSender,
    ) -> Result<Self> {
        let store = TypedStore::new(storage.clone());

        let (requesters, requester_frames) = ChannelTransport::new(TransportConfig {
            name: TransportName::Requesters.as_str().to_string(),
            ..Default::default()
        });
        let requesters =
            Arc::new(requesters.with_persistence(store.clone(), StorageKey::RequesterPeers));

        let (remote_wallets, remote_frames) = ChannelTransport::new(TransportConfig {
            name: TransportName::RemoteWallets.as_str().to_string(),
            ..Default::default()
        });
        let remote_wallets =
            Arc::new(remote_wallets.with_persistence(store, StorageKey::RemoteWalletPeers));

        let (popup, popup_inbox) = ChannelPopup::new();
        let popup = Arc::new(popup);

        let bridge = Bridge::start(
            config,
            BridgeParts {
                storage,
                codec: Arc::new(Base58CheckCodec),
                requesters: requesters.clone(),
                remote_wallets: remote_wallets.clone(),
                popup: PopupRelay::new(popup.clone()),
            },
        )
        .await?;

        let state = HostState {
            out,
            contexts: Arc::new(DashMap::new()),
            client: bridge.client().clone(),
            background: bridge.handle(),
            requesters,
            remote_wallets,
            popup,
        };

        let forwarders = vec![
            spawn_peer_forwarder(state.clone(), TransportName::Requesters, requester_frames),
            spawn_peer_forwarder(state.clone(), TransportName::RemoteWallets, remote_frames),
            spawn_popup_forwarder(state.clone(), popup_inbox),
        ];

        Ok(Self {
            state,
            bridge,
            forwarders,
        })
    }

    /// Stop forwarding and shut the bridge down.
    pub async fn shutdown(self) -> Result<()> {
        for task in &self.forwarders {
            task.abort();
        }
        self.bridge.shutdown().await
    }
}

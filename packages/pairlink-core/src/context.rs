//! # Execution Contexts
//!
//! The background and popup contexts as independent tokio tasks that share
//! nothing but channels.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          BACKGROUND CONTEXT                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  BackgroundHandle ──► inbox ──────────┐                                 │
//! │                                       │                                 │
//! │  requesters.subscribe() ──────────────┤   tokio::select! {              │
//! │                                       ├──►  inbox, requester events,    │
//! │  remote_wallets.subscribe() ──────────┤     remote events, sweep tick   │
//! │                                       │   }                             │
//! │  sweep interval ──────────────────────┘           │                     │
//! │                                                   ▼                     │
//! │                                        Dispatcher::route (one at a time)│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────┐  PopupEvent::Request   ┌───────────────────────────┐
//! │ background       │ ─────────────────────► │ popup context             │
//! │                  │ ◄───────────────────── │  DecisionPrompt::present  │
//! └──────────────────┘  Action::Response      └───────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::actions::Action;
use crate::client::BridgeClient;
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::{Error, Result};
use crate::message::{
    ConnectionContext, DomainMessage, Envelope, ErrorType, Origin, Responder, Target,
    UserDecision, POPUP_SENDER,
};
use crate::popup::{DecisionPrompt, PopupEvent};
use crate::transport::TransportEvent;

/// One envelope and the channel it arrived on
#[derive(Debug)]
pub struct Inbound {
    /// The envelope
    pub envelope: Envelope,
    /// Where it came from
    pub connection: ConnectionContext,
}

/// Messages accepted by the background inbox
#[derive(Debug)]
pub enum Command {
    /// Route an envelope
    Dispatch(Inbound),
    /// Stop the context
    Shutdown,
}

/// Cloneable sender side of the background inbox
#[derive(Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<Command>,
}

impl BackgroundHandle {
    /// Queue an envelope for dispatch
    pub async fn post(&self, envelope: Envelope, connection: ConnectionContext) -> Result<()> {
        self.tx
            .send(Command::Dispatch(Inbound {
                envelope,
                connection,
            }))
            .await
            .map_err(|_| Error::ContextClosed("background".into()))
    }

    /// Dispatch an envelope and wait for the first reply on its channel
    ///
    /// Meant for BACKGROUND actions, which always reply. A PAGE request
    /// keeps its channel open until it is answered.
    pub async fn request(
        &self,
        envelope: Envelope,
        context_id: impl Into<String>,
        origin: Origin,
    ) -> Result<Value> {
        let (responder, mut replies) = Responder::channel();
        let connection = ConnectionContext::new(context_id, origin).with_responder(responder);
        self.post(envelope, connection).await?;

        replies
            .recv()
            .await
            .ok_or_else(|| Error::ContextClosed("channel closed without a reply".into()))
    }

    /// Ask the context to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| Error::ContextClosed("background".into()))
    }

    /// Whether the context has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// BACKGROUND
// ============================================================================

/// The background context task
pub struct BackgroundContext {
    router: Router,
    inbox: mpsc::Receiver<Command>,
    requester_events: broadcast::Receiver<TransportEvent>,
    remote_events: broadcast::Receiver<TransportEvent>,
}

/// The part of the context the loop body borrows
struct Router {
    client: Arc<BridgeClient>,
    dispatcher: Dispatcher,
}

impl BackgroundContext {
    /// Create the context and the handle other contexts post through
    pub fn new(client: Arc<BridgeClient>, dispatcher: Dispatcher) -> (Self, BackgroundHandle) {
        let (tx, inbox) = mpsc::channel(client.config().inbox_capacity.max(1));
        // Subscribe before returning so no peer message slips past
        let requester_events = client.requesters().subscribe();
        let remote_events = client.remote_wallets().subscribe();
        let context = Self {
            router: Router { client, dispatcher },
            inbox,
            requester_events,
            remote_events,
        };
        (context, BackgroundHandle { tx })
    }

    /// Run on a new tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process inbox messages, transport events and sweeps until shutdown
    pub async fn run(self) {
        let Self {
            router,
            mut inbox,
            mut requester_events,
            mut remote_events,
        } = self;

        let period = sweep_period(router.client.config().sweep_interval_secs);
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(name = router.client.config().name.as_str(), "Background context started");

        loop {
            tokio::select! {
                command = inbox.recv() => {
                    match command {
                        Some(Command::Dispatch(inbound)) => router.dispatch(inbound).await,
                        Some(Command::Shutdown) => {
                            tracing::info!("Shutdown requested");
                            break;
                        }
                        None => {
                            tracing::info!("All handles dropped");
                            break;
                        }
                    }
                }

                event = requester_events.recv() => {
                    if !router.on_transport_event("requesters", Origin::Requester, event).await {
                        break;
                    }
                }

                event = remote_events.recv() => {
                    if !router.on_transport_event("remote_wallets", Origin::RemoteWallet, event).await {
                        break;
                    }
                }

                _ = sweep.tick() => {
                    router.sweep();
                }
            }
        }

        tracing::info!("Background context stopped");
    }

    /// Evict and log requests older than the configured TTL
    pub fn sweep(&self) -> usize {
        self.router.sweep()
    }
}

/// Longest sweep interval; keeps `Instant` arithmetic in range
const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn sweep_period(interval_secs: u64) -> Duration {
    if interval_secs > MAX_SWEEP_INTERVAL_SECS {
        tracing::warn!(
            requested = interval_secs,
            max = MAX_SWEEP_INTERVAL_SECS,
            "Sweep interval clamped"
        );
    }
    Duration::from_secs(interval_secs.clamp(1, MAX_SWEEP_INTERVAL_SECS))
}

impl Router {
    async fn dispatch(&self, inbound: Inbound) {
        let remote_connected = match self.client.is_remote_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read active wallet, assuming local");
                false
            }
        };

        let ctx = DispatchContext::new(inbound.connection, remote_connected);
        let report = self.dispatcher.route(&inbound.envelope, &ctx).await;
        if !report.is_clean() {
            tracing::debug!(
                context_id = ctx.connection.id.as_str(),
                listener_failures = report.listener_errors.len(),
                handler_failed = report.handler_error.is_some(),
                "Dispatch finished with errors"
            );
        }
    }

    /// Returns `false` when the event stream is gone
    ///
    /// `origin` tags peer messages with the transport they arrived on.
    async fn on_transport_event(
        &self,
        transport: &'static str,
        origin: Origin,
        event: std::result::Result<TransportEvent, RecvError>,
    ) -> bool {
        match event {
            Ok(TransportEvent::MessageReceived { from, message }) => {
                let decoded = match self.client.codec().decode(&message) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::warn!(transport, from = from.as_str(), error = %e, "Undecodable peer message");
                        return true;
                    }
                };

                let envelope = match Envelope::page_message(from.clone(), &decoded) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::warn!(transport, error = %e, "Could not wrap peer message");
                        return true;
                    }
                };

                self.dispatch(Inbound {
                    envelope,
                    connection: ConnectionContext::new(from, origin),
                })
                .await;
                true
            }
            Ok(event) => {
                tracing::debug!(transport, ?event, "Transport event");
                true
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(transport, skipped, "Transport events lagged");
                true
            }
            Err(RecvError::Closed) => {
                tracing::warn!(transport, "Transport event stream closed");
                false
            }
        }
    }

    fn sweep(&self) -> usize {
        let ttl = Duration::from_secs(self.client.config().request_ttl_secs);
        let expired = self.client.ledger().sweep_expired(ttl);
        for entry in &expired {
            tracing::warn!(
                id = entry.message.id.as_str(),
                context_id = entry.connection.id.as_str(),
                "Pending request expired unanswered"
            );
        }
        expired.len()
    }
}

// ============================================================================
// POPUP
// ============================================================================

/// The popup context task
pub struct PopupContext {
    inbox: mpsc::UnboundedReceiver<Envelope>,
    prompt: Arc<dyn DecisionPrompt>,
    background: BackgroundHandle,
}

impl PopupContext {
    /// Popup reading `inbox`, asking `prompt`, answering through `background`
    pub fn new(
        inbox: mpsc::UnboundedReceiver<Envelope>,
        prompt: Arc<dyn DecisionPrompt>,
        background: BackgroundHandle,
    ) -> Self {
        Self {
            inbox,
            prompt,
            background,
        }
    }

    /// Run on a new tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Present requests until the inbox closes
    pub async fn run(mut self) {
        while let Some(envelope) = self.inbox.recv().await {
            let event: PopupEvent = match serde_json::from_value(envelope.payload) {
                Ok(event) => event,
                Err(_) => {
                    tracing::debug!(sender = envelope.sender.as_str(), "Popup envelope is not an event");
                    continue;
                }
            };

            match event {
                PopupEvent::Request { message } => {
                    let id = message.id.clone();
                    if let Err(e) = self.answer(message).await {
                        tracing::warn!(id = id.as_str(), error = %e, "Failed to answer request");
                    }
                }
                PopupEvent::Paired { peer } => {
                    tracing::info!(public_key = peer.public_key.as_str(), "Popup saw pairing");
                }
            }
        }
        tracing::debug!("Popup inbox closed");
    }

    async fn answer(&self, request: DomainMessage) -> Result<()> {
        let decision = match self.prompt.present(&request).await {
            Ok(Some(decision)) => decision,
            Ok(None) => UserDecision::Reject {
                error_type: ErrorType::Aborted,
            },
            Err(e) => {
                tracing::warn!(id = request.id.as_str(), error = %e, "Prompt failed");
                UserDecision::Reject {
                    error_type: ErrorType::Unknown,
                }
            }
        };

        let envelope = Envelope::new(
            Target::Background,
            POPUP_SENDER,
            Action::Response { request, decision },
        )?;
        let reply = self.background.request(envelope, POPUP_SENDER, Origin::Popup).await?;

        if let Some(error) = reply.get("error") {
            tracing::warn!(%error, "Background rejected the response");
        }
        Ok(())
    }
}

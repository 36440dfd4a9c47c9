//! # Pairlink Core
//!
//! Message routing and session state for a wallet extension that pairs with
//! remote requesters (dapps) and remote signing wallets.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PAIRLINK CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Context    │  │  Dispatch   │  │   Actions   │  │    Client    │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Inbox     │─►│ - By target │─►│ - Table     │─►│ - Ledger     │   │
//! │  │ - Events    │  │ - Listeners │  │ - Replies   │  │ - Responses  │   │
//! │  │ - Sweep     │  │ - Isolation │  │             │  │ - Forwarding │   │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────┬───────┘   │
//! │                                                            │           │
//! │         ┌──────────────────────┬───────────────────────────┤           │
//! │         ▼                      ▼                           ▼           │
//! │  ┌─────────────┐  ┌──────────────────────┐  ┌─────────────────────┐    │
//! │  │  Registry   │  │      Transport       │  │       Popup         │    │
//! │  │             │  │                      │  │                     │    │
//! │  │ - Wallets   │  │ - Requester peers    │  │ - Open / focus      │    │
//! │  │ - Perms     │  │ - Remote wallet peers│  │ - Decision prompt   │    │
//! │  │ - Metadata  │  │ - Codec strings      │  │                     │    │
//! │  └──────┬──────┘  └──────────────────────┘  └─────────────────────┘    │
//! │         ▼                                                              │
//! │  ┌─────────────┐                                                       │
//! │  │  Storage    │  get / set / delete (memory or SQLite)                │
//! │  └─────────────┘                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`message`] - Envelopes, domain messages and user decisions
//! - [`codec`] - Domain message <-> transport string
//! - [`account`] - Sender ids, addresses and account identifiers
//! - [`storage`] - Key/value persistence (memory, SQLite)
//! - [`registry`] - Wallets, permissions and app metadata
//! - [`transport`] - Pairing transports and their peers
//! - [`ledger`] - Pending request correlation
//! - [`popup`] - Popup relay and the decision prompt
//! - [`client`] - Response delivery and request forwarding
//! - [`dispatch`] - Target routing and listeners
//! - [`actions`] - Background action table
//! - [`context`] - Background and popup tasks
//! - [`handshake`] - URL query handshake

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod account;
pub mod actions;
pub mod client;
pub mod codec;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod ledger;
pub mod message;
pub mod popup;
pub mod registry;
pub mod storage;
/// Timestamp helpers.
pub mod time;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use client::{BridgeClient, BridgeParts, Delivery};
pub use context::{BackgroundContext, BackgroundHandle, PopupContext};
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{Error, ErrorReport, Result};
pub use message::{DomainMessage, Envelope, Target, UserDecision};

// ============================================================================
// CONFIGURATION
// ============================================================================

use std::sync::Arc;

use tokio::task::JoinHandle;

/// Configuration for a bridge instance
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Display name reported by the handshake action
    pub name: String,
    /// Sender id stamped on every response this bridge produces
    pub sender_id: String,
    /// Protocol version reported by the handshake action
    pub protocol_version: String,
    /// Unanswered requests older than this are evicted
    pub request_ttl_secs: u64,
    /// How often the ledger is swept
    pub sweep_interval_secs: u64,
    /// Background inbox capacity
    pub inbox_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "pairlink".to_string(),
            sender_id: "pairlink".to_string(),
            protocol_version: message::PROTOCOL_VERSION.to_string(),
            request_ttl_secs: 300,
            sweep_interval_secs: 30,
            inbox_capacity: 256,
        }
    }
}

/// A running bridge: the shared client plus its background context
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                          BRIDGE LIFECYCLE                               │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. start(config, parts)                                                │
/// │       ├──► wire BridgeClient over storage, codec, transports, popup     │
/// │       ├──► connect both transports (persisted peers reload)             │
/// │       └──► spawn BackgroundContext with the standard dispatcher         │
/// │                                                                         │
/// │  2. Running                                                             │
/// │       ├──► handle().post(envelope, connection)                          │
/// │       └──► transports deliver peer messages                             │
/// │                                                                         │
/// │  3. shutdown()                                                          │
/// │       └──► stop the background task and wait for it                     │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct Bridge {
    client: Arc<BridgeClient>,
    handle: BackgroundHandle,
    task: JoinHandle<()>,
}

impl Bridge {
    /// Wire, connect and spawn
    pub async fn start(config: BridgeConfig, parts: BridgeParts) -> Result<Self> {
        tracing::info!(
            name = config.name.as_str(),
            "Starting Pairlink Core v{}",
            env!("CARGO_PKG_VERSION")
        );

        let client = Arc::new(BridgeClient::new(config, parts));
        client.connect().await?;

        let (context, handle) =
            BackgroundContext::new(client.clone(), Dispatcher::standard(client.clone()));
        let task = context.spawn();

        Ok(Self {
            client,
            handle,
            task,
        })
    }

    /// The shared client
    pub fn client(&self) -> &Arc<BridgeClient> {
        &self.client
    }

    /// Handle for posting envelopes to the background context
    pub fn handle(&self) -> BackgroundHandle {
        self.handle.clone()
    }

    /// Stop the background context and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Shutting down Pairlink Core");
        // Already gone is fine
        let _ = self.handle.shutdown().await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("background task: {}", e)))?;
        tracing::info!("Pairlink Core shutdown complete");
        Ok(())
    }
}

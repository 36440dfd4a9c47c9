//! # Dispatcher
//!
//! Routes each envelope to exactly one handler by target, then fans it out
//! to every registered listener.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             ROUTING TABLE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   target ─────────┬─► "page"       ──► PageHandler                      │
//! │                   ├─► "background" ──► BackgroundHandler                │
//! │                   ├─► "extension"  ──► ExtensionHandler                 │
//! │                   └─► anything else ─► NoopHandler                      │
//! │                                                                         │
//! │   listeners ──► every envelope, concurrently, after the handler         │
//! │                                                                         │
//! │   A failing (or panicking) handler or listener is logged and reported; │
//! │   it never affects the others.                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod background;
mod extension;
mod page;

pub use background::BackgroundHandler;
pub use extension::ExtensionHandler;
pub use page::PageHandler;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;

use crate::client::BridgeClient;
use crate::error::{Error, Result};
use crate::message::{ConnectionContext, Envelope, Target};

/// Per-dispatch facts handlers need besides the envelope
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Channel the envelope arrived on
    pub connection: ConnectionContext,
    /// Whether the active wallet is a paired remote wallet
    pub remote_connected: bool,
}

impl DispatchContext {
    /// Context for an envelope from `connection`
    pub fn new(connection: ConnectionContext, remote_connected: bool) -> Self {
        Self {
            connection,
            remote_connected,
        }
    }
}

/// Handles envelopes for one target
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one envelope
    async fn handle(&self, envelope: &Envelope, ctx: &DispatchContext) -> Result<()>;
}

/// Observes every routed envelope
#[async_trait]
pub trait Listener: Send + Sync {
    /// Called once per routed envelope
    async fn on_envelope(&self, envelope: &Envelope, ctx: &DispatchContext) -> Result<()>;
}

/// Handler for unrecognized targets
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(&self, envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
        tracing::debug!(
            sender = envelope.sender.as_str(),
            to = envelope.target.as_str(),
            "No handler for target, ignoring"
        );
        Ok(())
    }
}

/// Outcome of routing one envelope
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Error from the target handler
    pub handler_error: Option<Error>,
    /// Errors from listeners, in registration order of failure
    pub listener_errors: Vec<Error>,
}

impl DispatchReport {
    /// Whether the handler and every listener succeeded
    pub fn is_clean(&self) -> bool {
        self.handler_error.is_none() && self.listener_errors.is_empty()
    }
}

/// Target-keyed routing table plus listeners
pub struct Dispatcher {
    handlers: HashMap<Target, Arc<dyn MessageHandler>>,
    fallback: Arc<dyn MessageHandler>,
    listeners: Vec<Arc<dyn Listener>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// An empty table; every target falls through to the no-op handler
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(NoopHandler),
            listeners: Vec::new(),
        }
    }

    /// The standard table: page, background and extension handlers over
    /// one client
    pub fn standard(client: Arc<BridgeClient>) -> Self {
        Self::new()
            .with_handler(Target::Page, Arc::new(PageHandler::new(client.clone())))
            .with_handler(
                Target::Background,
                Arc::new(BackgroundHandler::new(client.clone())),
            )
            .with_handler(Target::Extension, Arc::new(ExtensionHandler::new(client)))
    }

    /// Register the handler for `target`, replacing any previous one
    pub fn with_handler(mut self, target: Target, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(target, handler);
        self
    }

    /// Register a listener
    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Handler that `target` routes to
    pub fn handler_for(&self, target: Target) -> Arc<dyn MessageHandler> {
        self.handlers
            .get(&target)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Route one envelope
    pub async fn route(&self, envelope: &Envelope, ctx: &DispatchContext) -> DispatchReport {
        let handler = self.handler_for(envelope.target);
        let handler_error = match isolate(handler.handle(envelope, ctx)).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    to = envelope.target.as_str(),
                    sender = envelope.sender.as_str(),
                    code = e.code(),
                    error = %e,
                    "Handler failed"
                );
                Some(e)
            }
        };

        let results = join_all(
            self.listeners
                .iter()
                .map(|listener| isolate(listener.on_envelope(envelope, ctx))),
        )
        .await;

        let listener_errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        for e in &listener_errors {
            tracing::error!(code = e.code(), error = %e, "Listener failed");
        }

        DispatchReport {
            handler_error,
            listener_errors,
        }
    }
}

/// Run `fut`, turning a panic into [`Error::Internal`]
async fn isolate<F>(fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::Internal(format!("panicked: {}", reason)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Origin;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Recording {
        async fn handle(&self, envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
            self.seen.lock().push(envelope.sender.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl Listener for Recording {
        async fn on_envelope(&self, envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
            self.seen.lock().push(envelope.sender.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Listener for Failing {
        async fn on_envelope(&self, _envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
            Err(Error::Internal("listener failed".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Listener for Panicking {
        async fn on_envelope(&self, _envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
            panic!("listener exploded");
        }
    }

    #[async_trait]
    impl MessageHandler for Panicking {
        async fn handle(&self, _envelope: &Envelope, _ctx: &DispatchContext) -> Result<()> {
            panic!("handler exploded");
        }
    }

    fn ctx() -> DispatchContext {
        DispatchContext::new(ConnectionContext::new("test", Origin::Host), false)
    }

    fn envelope(target: Target, sender: &str) -> Envelope {
        Envelope::new(target, sender, json!({})).unwrap()
    }

    #[tokio::test]
    async fn test_routes_by_target_only() {
        let page = Arc::new(Recording::default());
        let background = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new()
            .with_handler(Target::Page, page.clone())
            .with_handler(Target::Background, background.clone());

        assert!(dispatcher.route(&envelope(Target::Page, "p1"), &ctx()).await.is_clean());
        assert!(dispatcher.route(&envelope(Target::Background, "b1"), &ctx()).await.is_clean());

        assert_eq!(*page.seen.lock(), vec!["p1"]);
        assert_eq!(*background.seen.lock(), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_unknown_target_is_noop() {
        let page = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new().with_handler(Target::Page, page.clone());

        let report = dispatcher.route(&envelope(Target::Unknown, "x"), &ctx()).await;
        assert!(report.is_clean());
        // Extension has no handler registered here either
        let report = dispatcher.route(&envelope(Target::Extension, "y"), &ctx()).await;
        assert!(report.is_clean());
        assert!(page.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_every_listener_sees_every_envelope() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new()
            .with_listener(first.clone())
            .with_listener(second.clone());
        assert_eq!(dispatcher.listener_count(), 2);

        dispatcher.route(&envelope(Target::Page, "a"), &ctx()).await;
        dispatcher.route(&envelope(Target::Unknown, "b"), &ctx()).await;

        assert_eq!(*first.seen.lock(), vec!["a", "b"]);
        assert_eq!(*second.seen.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failing_listeners_are_isolated() {
        let healthy = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new()
            .with_listener(Arc::new(Failing))
            .with_listener(Arc::new(Panicking))
            .with_listener(healthy.clone());

        let report = dispatcher.route(&envelope(Target::Page, "a"), &ctx()).await;

        assert!(report.handler_error.is_none());
        assert_eq!(report.listener_errors.len(), 2);
        assert!(report
            .listener_errors
            .iter()
            .any(|e| e.to_string().contains("listener exploded")));
        assert_eq!(*healthy.seen.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_panicking_handler_still_reaches_listeners() {
        let listener = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new()
            .with_handler(Target::Page, Arc::new(Panicking))
            .with_listener(listener.clone());

        let report = dispatcher.route(&envelope(Target::Page, "a"), &ctx()).await;

        assert!(matches!(report.handler_error, Some(Error::Internal(_))));
        assert_eq!(*listener.seen.lock(), vec!["a"]);
    }
}

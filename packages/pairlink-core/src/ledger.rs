//! # Pending Request Ledger
//!
//! Correlates each outstanding request id with the connection context that
//! must receive its response.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        REQUEST CORRELATION                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  request "r1" arrives ──► record(r1, ctx) ──► { r1 → (request, ctx) }   │
//! │                                                                         │
//! │  response "r1" ready  ──► take(r1) ──► (request, ctx), entry evicted    │
//! │                                                                         │
//! │  response "r9"        ──► take(r9) ──► RequestNotFound                  │
//! │                                                                         │
//! │  sweep(ttl)           ──► evict entries older than ttl                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::message::{ConnectionContext, DomainMessage};

/// An outstanding request and where its answer goes
#[derive(Debug, Clone)]
pub struct PendingRequestEntry {
    /// The request as received
    pub message: DomainMessage,
    /// Channel the request came in on
    pub connection: ConnectionContext,
    /// When it was recorded (millis)
    pub recorded_at: i64,
}

/// Outstanding requests keyed by id
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: DashMap<String, PendingRequestEntry>,
}

impl PendingRequests {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request; returns the entry it replaced, if the id was reused
    pub fn record(
        &self,
        message: DomainMessage,
        connection: ConnectionContext,
    ) -> Option<PendingRequestEntry> {
        let id = message.id.clone();
        let entry = PendingRequestEntry {
            message,
            connection,
            recorded_at: crate::time::now_timestamp_millis(),
        };

        let replaced = self.entries.insert(id.clone(), entry);
        if replaced.is_some() {
            tracing::warn!(id = id.as_str(), "Request id reused, replacing pending entry");
        }
        replaced
    }

    /// Remove and return the entry for `id`
    pub fn take(&self, id: &str) -> Result<PendingRequestEntry> {
        self.entries
            .remove(id)
            .map(|(_, entry)| entry)
            .ok_or_else(|| Error::RequestNotFound(id.to_string()))
    }

    /// Put back an entry whose response could not be delivered
    pub fn restore(&self, entry: PendingRequestEntry) {
        self.entries.insert(entry.message.id.clone(), entry);
    }

    /// Copy of the entry for `id`
    pub fn get(&self, id: &str) -> Option<PendingRequestEntry> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Outstanding requests, oldest first
    pub fn requests(&self) -> Vec<DomainMessage> {
        let mut entries: Vec<(i64, DomainMessage)> = self
            .entries
            .iter()
            .map(|entry| (entry.recorded_at, entry.message.clone()))
            .collect();
        entries.sort_by_key(|(recorded_at, _)| *recorded_at);
        entries.into_iter().map(|(_, message)| message).collect()
    }

    /// Evict entries at least `ttl` old
    pub fn sweep_expired(&self, ttl: Duration) -> Vec<PendingRequestEntry> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| crate::time::age_secs(entry.recorded_at) >= ttl.as_secs())
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, entry)| entry))
            .collect()
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Origin};

    fn request(id: &str) -> DomainMessage {
        DomainMessage::new(id, MessageType::PermissionRequest, "dapp1")
    }

    #[test]
    fn test_take_returns_recorded_context() {
        let ledger = PendingRequests::new();
        ledger.record(request("r1"), ConnectionContext::new("tab-1", Origin::Page));
        ledger.record(request("r2"), ConnectionContext::new("tab-2", Origin::Page));

        let entry = ledger.take("r2").unwrap();
        assert_eq!(entry.connection.id, "tab-2");
        assert_eq!(entry.message.id, "r2");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_second_take_is_not_found() {
        let ledger = PendingRequests::new();
        ledger.record(request("r1"), ConnectionContext::new("tab-1", Origin::Page));

        assert!(ledger.take("r1").is_ok());
        assert!(matches!(ledger.take("r1"), Err(Error::RequestNotFound(_))));
        assert!(matches!(ledger.take("never"), Err(Error::RequestNotFound(_))));
    }

    #[test]
    fn test_restore_after_failed_delivery() {
        let ledger = PendingRequests::new();
        ledger.record(request("r1"), ConnectionContext::new("tab-1", Origin::Page));

        let entry = ledger.take("r1").unwrap();
        assert!(ledger.is_empty());
        ledger.restore(entry);
        assert_eq!(ledger.get("r1").unwrap().connection.id, "tab-1");
    }

    #[test]
    fn test_reused_id_replaces_entry() {
        let ledger = PendingRequests::new();
        assert!(ledger
            .record(request("r1"), ConnectionContext::new("tab-1", Origin::Page))
            .is_none());
        assert!(ledger
            .record(request("r1"), ConnectionContext::new("tab-2", Origin::Page))
            .is_some());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("r1").unwrap().connection.id, "tab-2");
    }

    #[test]
    fn test_sweep_expired() {
        let ledger = PendingRequests::new();
        ledger.record(request("r1"), ConnectionContext::new("tab-1", Origin::Page));
        ledger.record(request("r2"), ConnectionContext::new("tab-1", Origin::Page));

        assert!(ledger.sweep_expired(Duration::from_secs(300)).is_empty());
        assert_eq!(ledger.len(), 2);

        let expired = ledger.sweep_expired(Duration::ZERO);
        assert_eq!(expired.len(), 2);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_requests_listed_oldest_first() {
        let ledger = PendingRequests::new();
        ledger.record(request("r1"), ConnectionContext::new("tab-1", Origin::Page));
        std::thread::sleep(Duration::from_millis(2));
        ledger.record(request("r2"), ConnectionContext::new("tab-1", Origin::Page));

        let ids: Vec<String> = ledger.requests().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }
}

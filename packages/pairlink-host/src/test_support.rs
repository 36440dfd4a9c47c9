//! A host over in-memory storage whose output lines stay in a channel.

use std::sync::Arc;
use std::time::Duration;

use pairlink_core::storage::MemoryStorage;
use pairlink_core::BridgeConfig;
use tokio::sync::mpsc;

use crate::protocol::HostOutput;
use crate::state::{Host, HostState};

pub struct TestHost {
    pub state: HostState,
    pub output: mpsc::UnboundedReceiver<HostOutput>,
    _host: Host,
}

impl TestHost {
    pub async fn start() -> Self {
        let (tx, output) = mpsc::unbounded_channel();
        let host = Host::start(BridgeConfig::default(), Arc::new(MemoryStorage::new()), tx)
            .await
            .unwrap();

        Self {
            state: host.state.clone(),
            output,
            _host: host,
        }
    }

    pub async fn next_output(&mut self) -> HostOutput {
        tokio::time::timeout(Duration::from_secs(2), self.output.recv())
            .await
            .expect("timed out waiting for output")
            .expect("output channel closed")
    }

    pub fn try_output(&mut self) -> Option<HostOutput> {
        self.output.try_recv().ok()
    }
}

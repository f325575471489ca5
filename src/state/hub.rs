//! The Hub: shared state handed to every connection.
//!
//! Constructed once at startup and passed around as `Arc<Hub>`; there is no
//! global instance.

use std::sync::Arc;

use tracing::info;

use super::{CloseReason, ConnectionRegistry};
use crate::config::SessionConfig;
use crate::db::ChatStore;
use crate::handlers::{BroadcastRouter, MessageIngestWriter};

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    router: BroadcastRouter,
    ingest: MessageIngestWriter,
    settings: SessionConfig,
}

impl Hub {
    pub fn new(store: Arc<dyn ChatStore>, settings: SessionConfig) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&store));
        let ingest = MessageIngestWriter::new(store, router.clone());
        Arc::new(Self {
            registry,
            router,
            ingest,
            settings,
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub fn ingest(&self) -> &MessageIngestWriter {
        &self.ingest
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    /// Close every registered session. Connection tasks finish on their own.
    pub fn shutdown(&self) -> usize {
        let sessions = self.registry.snapshot_all();
        let closed = sessions
            .iter()
            .filter(|s| s.close(&self.registry, CloseReason::ServerShutdown))
            .count();
        info!(closed, "Hub shutdown: sessions closed");
        closed
    }
}

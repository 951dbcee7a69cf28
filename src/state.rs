use std::sync::Arc;

use crate::db::store::ReportStore;
use crate::ws::presence::PresenceRegistry;

/// Shared application state: the in-memory presence registry plus the durable
/// store collaborator. Everything else lives outside this process.
pub struct AppState {
    pub registry: PresenceRegistry,
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReportStore>) -> Arc<Self> {
        Arc::new(Self {
            registry: PresenceRegistry::new(),
            store,
        })
    }
}

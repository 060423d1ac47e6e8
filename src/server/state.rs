use std::sync::Arc;

use crate::config::Settings;
use crate::dispatcher::PresenceDispatcher;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<PresenceDispatcher>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(PresenceDispatcher::new(registry.clone()));

        Self {
            settings: Arc::new(settings),
            registry,
            dispatcher,
        }
    }
}

use std::sync::Arc;

use crate::services::{audit::AuditEngine, queue::JobQueue, store::ResultStore};

/// Collaborators the job controller is built from.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn ResultStore>,
    pub engine: Arc<dyn AuditEngine>,
}

impl AppState {
    pub fn new(
        queue: impl JobQueue + 'static,
        store: impl ResultStore + 'static,
        engine: impl AuditEngine + 'static,
    ) -> Self {
        Self {
            queue: Arc::new(queue),
            store: Arc::new(store),
            engine: Arc::new(engine),
        }
    }
}

// crates/server/src/state.rs
//! Shared application state handed to every route handler and worker.

use std::sync::Arc;
use std::time::Instant;

use taskdeck_core::llm::IntentClassifier;
use taskdeck_db::Database;
use tokio::sync::broadcast;

use crate::lifecycle::TaskLifecycleManager;
use crate::live::LifecycleEvent;
use crate::reconcile::TranscriptReconciler;
use crate::registry::SessionRegistry;

pub struct AppState {
    pub db: Database,
    pub registry: SessionRegistry,
    pub lifecycle: Arc<TaskLifecycleManager>,
    pub reconciler: Arc<TranscriptReconciler>,
    pub events_tx: broadcast::Sender<LifecycleEvent>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, classifier: Option<Arc<dyn IntentClassifier>>) -> Arc<Self> {
        let events_tx = crate::live::channel();
        let lifecycle = Arc::new(TaskLifecycleManager::new(
            db.clone(),
            classifier,
            events_tx.clone(),
        ));
        let reconciler = Arc::new(TranscriptReconciler::new(
            db.clone(),
            lifecycle.clone(),
            events_tx.clone(),
        ));
        Arc::new(Self {
            db,
            registry: SessionRegistry::new(),
            lifecycle,
            reconciler,
            events_tx,
            started_at: Instant::now(),
        })
    }
}

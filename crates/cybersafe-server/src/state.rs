//! Application state for the API server.

use std::sync::Arc;

use cybersafe_core::{FrontDoor, SafetyEngine, SeverityClassifier, WorkerHandle};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Engine for administrative operations and dashboard queries.
    pub engine: Arc<SafetyEngine>,
    /// Synchronous entry point for scoring events.
    pub front_door: FrontDoor,
}

impl AppState {
    /// Creates state from an engine and the handle of the lane that feeds it.
    pub fn new(engine: Arc<SafetyEngine>, lane: WorkerHandle) -> Self {
        let classifier = SeverityClassifier::new(engine.policy());
        Self {
            front_door: FrontDoor::new(classifier, lane),
            engine,
        }
    }
}

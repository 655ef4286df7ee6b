//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hwwatch_core::backend::simulated::SimulatedBackend;
use hwwatch_core::events::{ObservabilitySink, TriggerEvent};
use hwwatch_core::{AccessKind, TriggerDispatcher, WatchpointManager};

/// Sink that keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink
{
    events: Mutex<Vec<TriggerEvent>>,
}

impl RecordingSink
{
    pub fn events(&self) -> Vec<TriggerEvent>
    {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: AccessKind) -> usize
    {
        self.events.lock().unwrap().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize
    {
        self.events.lock().unwrap().len()
    }
}

impl ObservabilitySink for RecordingSink
{
    fn emit(&self, event: TriggerEvent)
    {
        self.events.lock().unwrap().push(event);
    }
}

/// Manager over a shared simulated backend, plus the backend and the sink.
pub fn setup() -> (
    Arc<WatchpointManager<Arc<SimulatedBackend>>>,
    Arc<SimulatedBackend>,
    Arc<RecordingSink>,
)
{
    setup_with_slots(hwwatch_core::backend::simulated::DEFAULT_SLOTS)
}

pub fn setup_with_slots(
    slots: usize,
) -> (
    Arc<WatchpointManager<Arc<SimulatedBackend>>>,
    Arc<SimulatedBackend>,
    Arc<RecordingSink>,
)
{
    let backend = Arc::new(SimulatedBackend::with_slots(slots));
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = TriggerDispatcher::new(sink.clone());
    let manager = Arc::new(WatchpointManager::new(Arc::clone(&backend), dispatcher));
    (manager, backend, sink)
}

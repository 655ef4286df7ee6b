//! # Watch Service
//!
//! Process lifecycle glue: build the dispatcher and manager, apply the initial
//! target, hand out the endpoint, and tear everything down on stop.
//!
//! Starting never fails. If the initial target cannot be armed the failure is
//! logged and the service runs with monitoring disabled; the operator can
//! retry through the endpoint.

use std::sync::Arc;

use tracing::{error, info};

use crate::backend::InstallationBackend;
use crate::dispatcher::{StatsSnapshot, TriggerDispatcher};
use crate::endpoint::ConfigEndpoint;
use crate::events::{event_channel, ObservabilitySink, TriggerEventReceiver, DEFAULT_EVENT_CAPACITY};
use crate::manager::WatchpointManager;
use crate::types::{Address, WatchTarget};

/// Backend-independent settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig
{
    /// Address to arm at start, [`Address::ZERO`] to start disabled.
    pub initial_target: WatchTarget,
    /// Capacity of the event queue [`WatchService::start_with_channel`] builds
    /// between the trigger context and the consumer.
    pub event_capacity: usize,
}

impl Default for WatchConfig
{
    fn default() -> Self
    {
        Self {
            initial_target: Address::ZERO,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// A running watch: manager, dispatcher, and endpoint.
pub struct WatchService<B: InstallationBackend>
{
    manager: Arc<WatchpointManager<B>>,
    stopped: bool,
}

impl<B: InstallationBackend> WatchService<B>
{
    /// Start watching through `backend`, reporting to `sink`.
    pub fn start(backend: B, sink: Arc<dyn ObservabilitySink>, config: &WatchConfig) -> Self
    {
        info!(backend = backend.name(), "hwwatch: init");
        let dispatcher = TriggerDispatcher::new(sink);
        let manager = Arc::new(WatchpointManager::new(backend, dispatcher));

        if !config.initial_target.is_null() {
            if let Err(err) = manager.configure(config.initial_target) {
                error!(code = err.code(), error = %err, "failed to set up initial watch, continuing without monitoring");
            }
        }

        Self { manager, stopped: false }
    }

    /// Start watching, reporting into a bounded queue of
    /// `config.event_capacity` events. The receiver is the consumer side.
    pub fn start_with_channel(backend: B, config: &WatchConfig) -> (Self, TriggerEventReceiver)
    {
        let (sink, receiver) = event_channel(config.event_capacity);
        (Self::start(backend, Arc::new(sink), config), receiver)
    }

    /// Operator endpoint.
    pub fn endpoint(&self) -> ConfigEndpoint<B>
    {
        ConfigEndpoint::new(Arc::clone(&self.manager))
    }

    /// Shared manager, for callers that need to tear down from elsewhere
    /// (a signal handler, for instance).
    pub fn manager(&self) -> &Arc<WatchpointManager<B>>
    {
        &self.manager
    }

    /// Dispatcher counters.
    pub fn stats(&self) -> StatsSnapshot
    {
        self.manager.dispatcher().stats()
    }

    /// Tear down the watch. Returns once every resource has been released.
    pub fn stop(mut self)
    {
        self.shutdown();
    }

    fn shutdown(&mut self)
    {
        if !self.stopped {
            self.manager.teardown();
            self.stopped = true;
            info!("hwwatch: exit");
        }
    }
}

impl<B: InstallationBackend> Drop for WatchService<B>
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}

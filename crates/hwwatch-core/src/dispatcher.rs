//! # Trigger Dispatcher
//!
//! The read and write callbacks handed to the backend.
//!
//! Each registration gets its own [`TriggerHandler`] that knows its kind and
//! the address it was installed for, so the reported address is always the one
//! the resource was armed at, even while a `configure` is replacing it. The
//! handlers never touch the manager: they stamp an event, bump a lock-free
//! counter, and pass the event to the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{RawAccess, TriggerHandler};
use crate::events::{ObservabilitySink, TriggerEvent};
use crate::types::{AccessKind, Address};

/// Point-in-time view of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot
{
    /// Read events dispatched.
    pub reads: u64,
    /// Write events dispatched.
    pub writes: u64,
    /// Events that never reached the consumer: discarded by the sink or lost
    /// by the backend before dispatch.
    pub dropped: u64,
}

/// Builds trigger events and forwards them to the observability sink.
pub struct TriggerDispatcher
{
    sink: Arc<dyn ObservabilitySink>,
    reads: AtomicU64,
    writes: AtomicU64,
    lost: AtomicU64,
}

impl std::fmt::Debug for TriggerDispatcher
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("TriggerDispatcher")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl TriggerDispatcher
{
    /// Dispatcher forwarding to `sink`.
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Arc<Self>
    {
        Arc::new(Self {
            sink,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        })
    }

    /// Callback for a resource of `kind` armed at `address`.
    pub fn handler(self: &Arc<Self>, kind: AccessKind, address: Address) -> Arc<dyn TriggerHandler>
    {
        Arc::new(KindHandler {
            kind,
            address,
            dispatcher: Arc::clone(self),
        })
    }

    /// Turn one backend report into an event and emit it.
    pub fn dispatch(&self, kind: AccessKind, address: Address, access: RawAccess)
    {
        let counter = match kind {
            AccessKind::Read => &self.reads,
            AccessKind::Write => &self.writes,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.sink.emit(TriggerEvent {
            kind,
            address,
            ip: access.ip,
            cpu: access.cpu,
            pid: access.pid,
            tid: access.tid,
            timestamp_ns: access.timestamp_ns,
            stack: access.stack,
        });
    }

    /// Account for accesses the backend could not report.
    pub fn record_lost(&self, kind: AccessKind, count: u64)
    {
        self.lost.fetch_add(count, Ordering::Relaxed);
        debug!(kind = %kind, count, "backend lost trigger events");
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot
    {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            dropped: self.sink.dropped() + self.lost.load(Ordering::Relaxed),
        }
    }
}

struct KindHandler
{
    kind: AccessKind,
    address: Address,
    dispatcher: Arc<TriggerDispatcher>,
}

impl TriggerHandler for KindHandler
{
    fn on_access(&self, access: RawAccess)
    {
        self.dispatcher.dispatch(self.kind, self.address, access);
    }

    fn on_lost(&self, count: u64)
    {
        self.dispatcher.record_lost(self.kind, count);
    }
}

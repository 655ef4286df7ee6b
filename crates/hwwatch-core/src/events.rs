//! Trigger events and observability sinks.
//!
//! The dispatcher turns every backend callback into a [`TriggerEvent`] and
//! hands it to an [`ObservabilitySink`]. Sinks are called from the trigger
//! context, so `emit` must not block: [`ChannelSink`] uses a bounded channel
//! with `try_send` and counts what it had to drop, and a consumer thread on the
//! other end does the slow work (symbolising, logging).

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, TrySendError};

use tracing::info;

use crate::types::{AccessKind, Address, StackTrace};

/// Default capacity of [`event_channel`] queues.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One access to the watched address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent
{
    /// Read or write.
    pub kind: AccessKind,
    /// The watched address the event was reported for.
    pub address: Address,
    /// Instruction that performed the access (zero if unknown).
    pub ip: Address,
    /// Processor the access happened on.
    pub cpu: Option<u32>,
    /// Accessing process.
    pub pid: Option<u32>,
    /// Accessing thread.
    pub tid: Option<u32>,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Call stack at the access.
    pub stack: StackTrace,
}

impl TriggerEvent
{
    /// Human-readable one-line summary.
    #[must_use]
    pub fn describe(&self) -> String
    {
        let mut description = format!("{} detected at addr={:#x}", self.kind, self.address);
        if !self.ip.is_null() {
            let _ = write!(description, " ip={:#x}", self.ip);
        }
        if let Some(cpu) = self.cpu {
            let _ = write!(description, " cpu={cpu}");
        }
        if let Some(pid) = self.pid {
            let _ = write!(description, " pid={pid}");
        }
        if let Some(tid) = self.tid {
            let _ = write!(description, " tid={tid}");
        }
        description
    }
}

/// Destination for trigger events.
pub trait ObservabilitySink: Send + Sync
{
    /// Accept one event. Called from the trigger context: must not block.
    fn emit(&self, event: TriggerEvent);

    /// Events this sink had to discard.
    fn dropped(&self) -> u64
    {
        0
    }
}

/// Bounded, non-blocking queue towards a consumer thread.
#[derive(Debug)]
pub struct ChannelSink
{
    sender: mpsc::SyncSender<TriggerEvent>,
    dropped: AtomicU64,
}

impl ObservabilitySink for ChannelSink
{
    fn emit(&self, event: TriggerEvent)
    {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn dropped(&self) -> u64
    {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiver side of the trigger event channel.
pub type TriggerEventReceiver = mpsc::Receiver<TriggerEvent>;

/// Create a new trigger event channel holding at most `capacity` events.
#[must_use]
pub fn event_channel(capacity: usize) -> (ChannelSink, TriggerEventReceiver)
{
    let (sender, receiver) = mpsc::sync_channel(capacity);
    (
        ChannelSink {
            sender,
            dropped: AtomicU64::new(0),
        },
        receiver,
    )
}

/// Sink that logs each event directly through `tracing`.
///
/// Only suitable where the trigger context is an ordinary thread (the perf
/// poller, the simulated backend); prefer [`ChannelSink`] otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink
{
    fn emit(&self, event: TriggerEvent)
    {
        info!(
            target: "hwwatch::trigger",
            kind = %event.kind,
            frames = event.stack.len(),
            "{}",
            event.describe()
        );
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn event(kind: AccessKind) -> TriggerEvent
    {
        TriggerEvent {
            kind,
            address: Address::new(0x1000),
            ip: Address::ZERO,
            cpu: Some(3),
            pid: None,
            tid: None,
            timestamp_ns: 0,
            stack: StackTrace::new(),
        }
    }

    #[test]
    fn test_describe_includes_kind_and_address()
    {
        let text = event(AccessKind::Write).describe();
        assert_eq!(text, "WRITE detected at addr=0x1000 cpu=3");
    }

    #[test]
    fn test_channel_sink_drops_when_full()
    {
        let (sink, receiver) = event_channel(1);
        sink.emit(event(AccessKind::Read));
        sink.emit(event(AccessKind::Read));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn test_channel_sink_drops_when_disconnected()
    {
        let (sink, receiver) = event_channel(4);
        drop(receiver);
        sink.emit(event(AccessKind::Write));
        assert_eq!(sink.dropped(), 1);
    }
}

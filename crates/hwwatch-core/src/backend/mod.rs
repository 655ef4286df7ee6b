//! # Installation Backends
//!
//! The seam between the watchpoint manager and whatever actually programs the
//! debug hardware.
//!
//! A backend installs one watch resource uniformly across every processor and
//! calls a [`TriggerHandler`] whenever the resource fires. Backends may block
//! (the manager only calls them from ordinary threads), but they must honour
//! one contract: once [`InstallationBackend::unregister_all`] returns, the
//! handler registered with that handle is never invoked again.
//!
//! ## Implementations
//!
//! - [`simulated::SimulatedBackend`]: in-memory register pool with fault injection
//! - `platform::linux::PerfBackend`: `perf_event_open` hardware breakpoints

pub mod simulated;

use std::fmt;
use std::sync::Arc;

use crate::error::BackendError;
use crate::types::{Address, StackTrace, WatchRequest};

/// One access reported by a backend, before the dispatcher turns it into a
/// [`TriggerEvent`](crate::events::TriggerEvent).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAccess
{
    /// Data address the hardware reported.
    pub address: Address,
    /// Instruction pointer of the accessing instruction (zero if unknown).
    pub ip: Address,
    /// Processor the access happened on.
    pub cpu: Option<u32>,
    /// Accessing process.
    pub pid: Option<u32>,
    /// Accessing thread.
    pub tid: Option<u32>,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Call stack at the time of the access.
    pub stack: StackTrace,
}

/// Callback invoked by a backend in the trigger context.
///
/// Implementations run on an asynchronous, interrupt-like context that may be
/// entered concurrently on any processor. They must not block, must not take
/// the manager's lock, and must finish in bounded time.
pub trait TriggerHandler: Send + Sync
{
    /// Called once per access that hit the watch resource.
    fn on_access(&self, access: RawAccess);

    /// The backend lost `count` accesses before they could be reported.
    fn on_lost(&self, _count: u64) {}
}

/// Facility that allocates and releases watch resources on all processors.
pub trait InstallationBackend: Send + Sync
{
    /// Opaque reservation spanning all processors.
    type Handle: Send + fmt::Debug;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Install one watch resource on every processor.
    ///
    /// ## Errors
    ///
    /// Returns a [`BackendError`] if the resource could not be installed on
    /// every processor. A partial install must be undone before returning.
    fn register(&self, request: WatchRequest, handler: Arc<dyn TriggerHandler>) -> Result<Self::Handle, BackendError>;

    /// Release a reservation on every processor.
    ///
    /// When this returns, the handler of `handle` will not be invoked again,
    /// whether or not an error is reported.
    ///
    /// ## Errors
    ///
    /// Returns a [`BackendError`] if the backend could not confirm the release.
    fn unregister_all(&self, handle: Self::Handle) -> Result<(), BackendError>;
}

/// Share one backend between the manager and its creator (the simulated
/// backend's access injector, for instance).
impl<B: InstallationBackend + ?Sized> InstallationBackend for Arc<B>
{
    type Handle = B::Handle;

    fn name(&self) -> &'static str
    {
        (**self).name()
    }

    fn register(&self, request: WatchRequest, handler: Arc<dyn TriggerHandler>) -> Result<Self::Handle, BackendError>
    {
        (**self).register(request, handler)
    }

    fn unregister_all(&self, handle: Self::Handle) -> Result<(), BackendError>
    {
        (**self).unregister_all(handle)
    }
}

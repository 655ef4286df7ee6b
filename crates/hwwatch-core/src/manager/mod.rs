//! # Watchpoint Manager
//!
//! The only mutator of watch state.
//!
//! The manager owns the current target and the read/write resource pair. Every
//! `configure` and `teardown` runs under one mutex for its whole duration,
//! including the (possibly blocking) backend calls, so reconfigurations are
//! totally ordered and no caller ever observes half a pair.
//!
//! ## State machine
//!
//! ```text
//!              configure(a != 0) ok
//!   Disabled ------------------------> Armed(a)
//!      ^  ^                             |  |
//!      |  +---- configure(0) ----------+  | configure(b) ok -> Armed(b)
//!      +------- teardown / install failure +
//! ```
//!
//! A failed `configure` always ends `Disabled`; [`WatchStatus::Faulted`]
//! remembers what was requested and why it failed until the next call.
//!
//! ## Trigger delivery
//!
//! Handlers are not ordered against `configure`. A handler may still fire for
//! the old address until its resource has been released, and the new pair may
//! fire just before the manager records it. Backends guarantee nothing fires
//! after release, so this window is narrow and never reports a stale resource
//! after `configure` returns.

mod guards;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info};

use self::guards::{release_handle, PendingInstall};
use crate::backend::InstallationBackend;
use crate::dispatcher::TriggerDispatcher;
use crate::error::InstallError;
use crate::types::{AccessKind, Address, WatchRequest, WatchTarget};

/// An installed resource, tagged with what it watches.
///
/// Owned exclusively by the manager and handed back to the backend exactly
/// once, on release.
#[derive(Debug)]
pub struct WatchHandle<H>
{
    kind: AccessKind,
    address: Address,
    inner: H,
}

impl<H> WatchHandle<H>
{
    pub(crate) const fn new(kind: AccessKind, address: Address, inner: H) -> Self
    {
        Self { kind, address, inner }
    }

    /// Access kind of the resource.
    pub const fn kind(&self) -> AccessKind
    {
        self.kind
    }

    /// Address the resource watches.
    pub const fn address(&self) -> Address
    {
        self.address
    }

    pub(crate) fn into_inner(self) -> H
    {
        self.inner
    }
}

/// Observable state of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus
{
    /// No target, no resources.
    Disabled,
    /// Both resources installed at this address.
    Armed(Address),
    /// The last `configure` asked for `requested` but installation failed;
    /// nothing is installed.
    Faulted
    {
        /// Address that was requested.
        requested: Address,
        /// Why it could not be armed.
        error: InstallError,
    },
}

/// Read and write resources, present together or not at all.
#[derive(Debug)]
struct HandlePair<H>
{
    read: WatchHandle<H>,
    write: WatchHandle<H>,
}

#[derive(Debug)]
struct ManagerState<H>
{
    target: WatchTarget,
    handles: Option<HandlePair<H>>,
    last_failure: Option<InstallError>,
}

/// Installs, replaces, and removes the watched read + write pair.
pub struct WatchpointManager<B: InstallationBackend>
{
    backend: B,
    dispatcher: Arc<TriggerDispatcher>,
    state: Mutex<ManagerState<B::Handle>>,
}

impl<B: InstallationBackend> std::fmt::Debug for WatchpointManager<B>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("WatchpointManager")
            .field("backend", &self.backend.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<B: InstallationBackend> WatchpointManager<B>
{
    /// Disabled manager installing through `backend` and reporting to
    /// `dispatcher`.
    pub fn new(backend: B, dispatcher: Arc<TriggerDispatcher>) -> Self
    {
        Self {
            backend,
            dispatcher,
            state: Mutex::new(ManagerState {
                target: Address::ZERO,
                handles: None,
                last_failure: None,
            }),
        }
    }

    /// Point the watch at `address`, or disable it with [`Address::ZERO`].
    ///
    /// Blocks: takes the manager lock and calls into the backend. Any
    /// installed pair is released first (release failures are logged and
    /// ignored). The new pair is installed read first, then write; if the
    /// write resource fails the read resource is rolled back.
    ///
    /// ## Errors
    ///
    /// - [`InstallError::Read`]: the read resource could not be installed
    /// - [`InstallError::Write`]: the write resource could not be installed
    ///
    /// On error the manager is disabled with nothing installed.
    pub fn configure(&self, address: WatchTarget) -> Result<(), InstallError>
    {
        let mut state = self.lock_state();
        self.release_installed(&mut state);
        state.last_failure = None;

        if address.is_null() {
            info!("monitoring disabled (addr=0)");
            return Ok(());
        }

        match self.install_pair(address) {
            Ok(pair) => {
                state.handles = Some(pair);
                state.target = address;
                info!(%address, backend = self.backend.name(), "monitoring {address:#x} (read+write)");
                Ok(())
            }
            Err(err) => {
                error!(%address, kind = %err.kind(), code = err.code(), error = %err, "watch install failed, monitoring disabled");
                state.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Release any installed resources and disable the watch. Safe to call
    /// when already disabled.
    pub fn teardown(&self)
    {
        let mut state = self.lock_state();
        let was_armed = state.handles.is_some();
        self.release_installed(&mut state);
        state.last_failure = None;
        if was_armed {
            info!("watch torn down");
        }
    }

    /// Currently armed target, [`Address::ZERO`] when disabled or faulted.
    pub fn target(&self) -> WatchTarget
    {
        self.lock_state().target
    }

    /// `true` while both resources are installed.
    pub fn is_armed(&self) -> bool
    {
        self.lock_state().handles.is_some()
    }

    /// Current state, including the last install failure.
    pub fn status(&self) -> WatchStatus
    {
        let state = self.lock_state();
        match (&state.handles, &state.last_failure) {
            (Some(_), _) => WatchStatus::Armed(state.target),
            (None, Some(error)) => WatchStatus::Faulted {
                requested: error.address(),
                error: error.clone(),
            },
            (None, None) => WatchStatus::Disabled,
        }
    }

    /// Dispatcher the resources report to.
    pub fn dispatcher(&self) -> &Arc<TriggerDispatcher>
    {
        &self.dispatcher
    }

    /// Backend the resources are installed through.
    pub fn backend(&self) -> &B
    {
        &self.backend
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState<B::Handle>>
    {
        // State is consistent at every point a panic could unwind from.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_installed(&self, state: &mut ManagerState<B::Handle>)
    {
        if let Some(HandlePair { read, write }) = state.handles.take() {
            release_handle(&self.backend, read);
            release_handle(&self.backend, write);
        }
        state.target = Address::ZERO;
    }

    fn install_pair(&self, address: Address) -> Result<HandlePair<B::Handle>, InstallError>
    {
        let read = PendingInstall::new(&self.backend, self.install(AccessKind::Read, address)?);
        let write = self.install(AccessKind::Write, address)?;
        Ok(HandlePair {
            read: read.commit(),
            write,
        })
    }

    fn install(&self, kind: AccessKind, address: Address) -> Result<WatchHandle<B::Handle>, InstallError>
    {
        let handler = self.dispatcher.handler(kind, address);
        self.backend
            .register(WatchRequest::new(kind, address), handler)
            .map(|inner| WatchHandle::new(kind, address, inner))
            .map_err(|source| InstallError::for_kind(kind, address, source))
    }
}

impl<B: InstallationBackend> Drop for WatchpointManager<B>
{
    fn drop(&mut self)
    {
        self.teardown();
    }
}

//! # Simulated Backend
//!
//! An in-memory stand-in for the debug register pool.
//!
//! Every installed resource takes one slot out of a fixed pool shared by all
//! kinds (x86-64 has four, DR0-DR3), and [`SimulatedBackend::access`] plays the
//! part of the hardware: it invokes every handler whose watch covers the
//! access.
//!
//! Handlers run while a read lock on the resource table is held and release
//! takes the write lock, so [`InstallationBackend::unregister_all`] waits for
//! in-flight callbacks. That is how the no-callback-after-release contract is
//! kept here.
//!
//! ## Fault injection
//!
//! Tests can make the next registration of a kind fail, or make the next
//! release report a failure. A failed release leaves the resource installed
//! (stale), which is the worst case the manager has to cope with.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, trace};

use crate::backend::{InstallationBackend, RawAccess, TriggerHandler};
use crate::error::BackendError;
use crate::types::{AccessKind, Address, StackTrace, WatchRequest};

/// Slots on x86-64 (DR0-DR3).
pub const DEFAULT_SLOTS: usize = 4;

/// Reservation handed out by [`SimulatedBackend`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SimHandle
{
    id: u64,
    request: WatchRequest,
}

impl SimHandle
{
    /// Backend-assigned identifier.
    pub const fn id(&self) -> u64
    {
        self.id
    }

    /// What this reservation watches.
    pub const fn request(&self) -> WatchRequest
    {
        self.request
    }
}

struct Installed
{
    request: WatchRequest,
    handler: Arc<dyn TriggerHandler>,
}

#[derive(Default)]
struct FaultPlan
{
    read: Option<BackendError>,
    write: Option<BackendError>,
    release: Option<BackendError>,
}

/// In-memory installation backend.
pub struct SimulatedBackend
{
    slots: usize,
    next_id: AtomicU64,
    epoch: Instant,
    installed: RwLock<HashMap<u64, Installed>>,
    faults: Mutex<FaultPlan>,
}

impl std::fmt::Debug for SimulatedBackend
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SimulatedBackend")
            .field("slots", &self.slots)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl Default for SimulatedBackend
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SimulatedBackend
{
    /// Backend with [`DEFAULT_SLOTS`] slots.
    #[must_use]
    pub fn new() -> Self
    {
        Self::with_slots(DEFAULT_SLOTS)
    }

    /// Backend with `slots` slots.
    #[must_use]
    pub fn with_slots(slots: usize) -> Self
    {
        Self {
            slots,
            next_id: AtomicU64::new(0),
            epoch: Instant::now(),
            installed: RwLock::new(HashMap::new()),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    /// Make the next registration of `kind` fail with `error`.
    pub fn fail_next_register(&self, kind: AccessKind, error: BackendError)
    {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            AccessKind::Read => faults.read = Some(error),
            AccessKind::Write => faults.write = Some(error),
        }
    }

    /// Make the next release report `error` and leave the resource installed.
    pub fn fail_next_release(&self, error: BackendError)
    {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).release = Some(error);
    }

    /// Number of installed resources.
    pub fn active_count(&self) -> usize
    {
        self.installed.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Installed resources, sorted by address then kind (read first).
    pub fn installed(&self) -> Vec<WatchRequest>
    {
        let table = self.installed.read().unwrap_or_else(PoisonError::into_inner);
        let mut requests: Vec<WatchRequest> = table.values().map(|entry| entry.request).collect();
        requests.sort_by_key(|r| (r.address, r.kind == AccessKind::Write));
        requests
    }

    /// Simulate an access with an empty stack. Returns how many handlers fired.
    pub fn access(&self, address: Address, kind: AccessKind) -> usize
    {
        self.access_with_stack(address, kind, StackTrace::new())
    }

    /// Simulate an access from a given call stack. Returns how many handlers
    /// fired.
    pub fn access_with_stack(&self, address: Address, kind: AccessKind, stack: StackTrace) -> usize
    {
        let table = self.installed.read().unwrap_or_else(PoisonError::into_inner);
        let timestamp_ns = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let mut fired = 0;
        for entry in table.values().filter(|entry| entry.request.matches(kind, address)) {
            entry.handler.on_access(RawAccess {
                address,
                ip: stack.frames().first().copied().unwrap_or_default(),
                cpu: Some(0),
                pid: Some(std::process::id()),
                tid: None,
                timestamp_ns,
                stack: stack.clone(),
            });
            fired += 1;
        }
        trace!(%address, %kind, fired, "simulated access");
        fired
    }

    fn take_register_fault(&self, kind: AccessKind) -> Option<BackendError>
    {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            AccessKind::Read => faults.read.take(),
            AccessKind::Write => faults.write.take(),
        }
    }
}

impl InstallationBackend for SimulatedBackend
{
    type Handle = SimHandle;

    fn name(&self) -> &'static str
    {
        "simulated"
    }

    fn register(&self, request: WatchRequest, handler: Arc<dyn TriggerHandler>) -> Result<SimHandle, BackendError>
    {
        if let Some(err) = self.take_register_fault(request.kind) {
            return Err(err);
        }

        let mut table = self.installed.write().unwrap_or_else(PoisonError::into_inner);
        if table.len() >= self.slots {
            return Err(BackendError::new(
                libc::ENOSPC,
                format!("no free debug register (all {} in use)", self.slots),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        table.insert(id, Installed { request, handler });
        debug!(id, kind = %request.kind, address = %request.address, "simulated watch installed");
        Ok(SimHandle { id, request })
    }

    fn unregister_all(&self, handle: SimHandle) -> Result<(), BackendError>
    {
        if let Some(err) = self.faults.lock().unwrap_or_else(PoisonError::into_inner).release.take() {
            return Err(err);
        }

        let mut table = self.installed.write().unwrap_or_else(PoisonError::into_inner);
        match table.remove(&handle.id) {
            Some(_) => {
                debug!(id = handle.id, "simulated watch released");
                Ok(())
            }
            None => Err(BackendError::new(
                libc::ENOENT,
                format!("no simulated watch with id {}", handle.id),
            )),
        }
    }
}

//! # RAII Guards for Watch Resources
//!
//! [`PendingInstall`] holds a resource that has been installed but not yet
//! committed to the manager state. If the surrounding install sequence bails
//! out (the write resource failed, a panic unwinds), dropping the guard
//! releases the resource, so the rollback path is the same for every exit.

use tracing::{debug, warn};

use super::WatchHandle;
use crate::backend::InstallationBackend;

/// Release `handle`, logging instead of failing.
///
/// A stale resource that refuses to go away must never block progress on a
/// new target, so a release failure is only a warning.
pub(crate) fn release_handle<B: InstallationBackend>(backend: &B, handle: WatchHandle<B::Handle>)
{
    let kind = handle.kind();
    let address = handle.address();
    match backend.unregister_all(handle.into_inner()) {
        Ok(()) => debug!(%kind, %address, backend = backend.name(), "watch resource released"),
        Err(err) => warn!(%kind, %address, code = err.code, error = %err, "failed to release watch resource"),
    }
}

/// A freshly installed resource that is released on drop unless committed.
pub(crate) struct PendingInstall<'a, B: InstallationBackend>
{
    backend: &'a B,
    handle: Option<WatchHandle<B::Handle>>,
}

impl<'a, B: InstallationBackend> PendingInstall<'a, B>
{
    pub(crate) fn new(backend: &'a B, handle: WatchHandle<B::Handle>) -> Self
    {
        Self {
            backend,
            handle: Some(handle),
        }
    }

    /// Keep the resource: the caller takes ownership and drop becomes a no-op.
    pub(crate) fn commit(mut self) -> WatchHandle<B::Handle>
    {
        match self.handle.take() {
            Some(handle) => handle,
            None => unreachable!("handle is only taken by commit or drop"),
        }
    }
}

impl<B: InstallationBackend> Drop for PendingInstall<'_, B>
{
    fn drop(&mut self)
    {
        if let Some(handle) = self.handle.take() {
            debug!(kind = %handle.kind(), address = %handle.address(), "rolling back watch resource");
            release_handle(self.backend, handle);
        }
    }
}

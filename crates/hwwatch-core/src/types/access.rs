//! Access kinds and watch requests.

use std::fmt;

use super::Address;

/// Width in bytes of every watch: the minimum addressable granularity.
pub const WATCH_WIDTH: usize = 1;

/// Kind of memory access a watch resource triggers on.
///
/// A watch is always installed as a pair: one resource per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind
{
    /// Trigger on read access to the watched address.
    Read,
    /// Trigger on write access to the watched address.
    Write,
}

impl AccessKind
{
    /// Upper-case label used in trigger reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str
    {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
        }
    }
}

impl fmt::Display for AccessKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Request handed to a backend to install one watch resource on every processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchRequest
{
    /// Access kind the resource triggers on.
    pub kind: AccessKind,
    /// Watched address.
    pub address: Address,
    /// Watched length in bytes, always [`WATCH_WIDTH`].
    pub length: usize,
}

impl WatchRequest
{
    /// Request a minimum-width watch of `kind` at `address`.
    #[must_use]
    pub const fn new(kind: AccessKind, address: Address) -> Self
    {
        Self {
            kind,
            address,
            length: WATCH_WIDTH,
        }
    }

    /// `true` if an access of `kind` at `address` falls inside this watch.
    #[must_use]
    pub fn matches(&self, kind: AccessKind, address: Address) -> bool
    {
        self.kind == kind
            && address
                .offset_from(self.address)
                .is_some_and(|offset| offset < self.length as u64)
    }
}

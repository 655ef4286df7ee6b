//! # Error Types
//!
//! Error handling for watchpoint configuration and installation.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! ## Error Categories
//!
//! 1. **Input errors**: [`ParseError`] (malformed operator input, nothing changes)
//! 2. **Install errors**: [`InstallError`] (the watch degrades to disabled)
//! 3. **Backend errors**: [`BackendError`] (errno-style failure from a backend)
//!
//! A failed release of a stale resource is not an error type at all: the
//! manager logs it as a warning and keeps going.

use thiserror::Error;

use crate::types::{AccessKind, Address};

/// Failure reported by an [`InstallationBackend`](crate::backend::InstallationBackend).
///
/// `code` follows the errno convention (positive values such as `ENOSPC`,
/// `EINVAL`, `EACCES`) so it can be surfaced to an operator unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct BackendError
{
    /// Errno-style code.
    pub code: i32,
    /// What the backend was doing when it failed.
    pub message: String,
}

impl BackendError
{
    /// Create a backend error from a code and a description.
    pub fn new(code: i32, message: impl Into<String>) -> Self
    {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Capture `errno` right after a failed system call.
    pub fn last_os_error(context: impl Into<String>) -> Self
    {
        let os = std::io::Error::last_os_error();
        let code = os.raw_os_error().unwrap_or(libc::EIO);
        Self::new(code, format!("{}: {os}", context.into()))
    }

    /// Errno-style code reported by the backend.
    #[must_use]
    pub const fn code(&self) -> i32
    {
        self.code
    }
}

/// Installing the read/write pair failed.
///
/// The backend's code is captured before any handle bookkeeping is reset, so
/// the reported code is always the one that caused the failure. In both cases
/// the manager is left disabled with no resources installed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError
{
    /// The read resource could not be allocated.
    #[error("failed to install read watchpoint at {address}: {source}")]
    Read
    {
        /// Requested address.
        address: Address,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// The read resource was allocated but the write resource was not. The
    /// read resource has been rolled back.
    #[error("failed to install write watchpoint at {address}: {source}")]
    Write
    {
        /// Requested address.
        address: Address,
        /// Backend failure.
        #[source]
        source: BackendError,
    },
}

impl InstallError
{
    pub(crate) fn for_kind(kind: AccessKind, address: Address, source: BackendError) -> Self
    {
        match kind {
            AccessKind::Read => Self::Read { address, source },
            AccessKind::Write => Self::Write { address, source },
        }
    }

    /// Which resource failed to install.
    #[must_use]
    pub const fn kind(&self) -> AccessKind
    {
        match self {
            Self::Read { .. } => AccessKind::Read,
            Self::Write { .. } => AccessKind::Write,
        }
    }

    /// Address the install was attempted at.
    #[must_use]
    pub const fn address(&self) -> Address
    {
        match self {
            Self::Read { address, .. } | Self::Write { address, .. } => *address,
        }
    }

    /// Errno-style code from the backend.
    #[must_use]
    pub const fn code(&self) -> i32
    {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => source.code,
        }
    }
}

/// Operator input could not be parsed as an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError
{
    /// Nothing but whitespace (or a lone sign) was given.
    #[error("empty address")]
    Empty,

    /// A character is not a digit in the detected base.
    #[error("invalid digit {digit:?} for base {radix} in {input:?}")]
    InvalidDigit
    {
        /// Input as received (trimmed).
        input: String,
        /// First offending character.
        digit: char,
        /// Base selected from the prefix.
        radix: u32,
    },

    /// The value does not fit in 64 bits.
    #[error("address {0:?} does not fit in 64 bits")]
    Overflow(String),
}

/// A configuration write failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError
{
    /// Input rejected, configuration unchanged.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Input accepted but the watch could not be armed.
    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Umbrella error for hwwatch operations.
#[derive(Error, Debug)]
pub enum HwWatchError
{
    /// Malformed address.
    #[error("Invalid address: {0}")]
    Parse(#[from] ParseError),

    /// Watch could not be armed.
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    /// A backend could not be created or queried.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Requested feature is not available on this platform.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error (reading symbol tables, CPU lists, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EndpointError> for HwWatchError
{
    fn from(err: EndpointError) -> Self
    {
        match err {
            EndpointError::Parse(e) => Self::Parse(e),
            EndpointError::Install(e) => Self::Install(e),
        }
    }
}

/// Convenience type alias for `Result<T, HwWatchError>`
///
/// ```rust
/// use hwwatch_core::error::HwWatchResult;
/// fn foo() -> HwWatchResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type HwWatchResult<T> = std::result::Result<T, HwWatchError>;

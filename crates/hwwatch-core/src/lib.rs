//! # hwwatch-core
//!
//! Hardware watchpoint lifecycle management for hwwatch.
//!
//! This crate watches one memory address for reads and writes and lets the
//! watched address be changed while the watch is live. It provides:
//! - The [`WatchpointManager`] state machine that installs and removes the
//!   paired read + write watch resources and rolls back partial installs
//! - The [`TriggerDispatcher`] whose handlers run in the trigger context and
//!   forward events to an [`ObservabilitySink`]
//! - The [`ConfigEndpoint`] operator surface (`get` / `set`)
//! - The [`WatchService`] process lifecycle glue
//!
//! ## Backends
//!
//! Installing a watch resource on every processor is the job of an
//! [`InstallationBackend`]:
//!
//! - **Linux**: `perf_event_open` hardware breakpoints, one event per online CPU
//! - **Simulated**: an in-memory debug register pool with fault injection,
//!   used by the tests and the `--backend simulated` mode of the binary
//!
//! ## Why unsafe code is needed
//!
//! The Linux backend issues raw `perf_event_open`, `mmap`, `poll`, and `ioctl`
//! calls and reads the kernel-shared sample ring. These calls are wrapped in
//! safe types (`PerfEvent`, `RingBuffer`) that own the descriptors and mappings.

#![allow(unsafe_code)] // Required for perf_event_open, mmap, and the sample ring

pub mod backend;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod manager;
pub mod parse;
pub mod platform;
pub mod prelude;
pub mod service;
pub mod symbols;
pub mod types;

pub use backend::{InstallationBackend, RawAccess, TriggerHandler};
pub use dispatcher::{StatsSnapshot, TriggerDispatcher};
pub use endpoint::ConfigEndpoint;
// Re-export commonly used types
pub use error::{BackendError, EndpointError, HwWatchError, HwWatchResult, InstallError, ParseError};
pub use events::{ObservabilitySink, TriggerEvent};
pub use manager::{WatchHandle, WatchStatus, WatchpointManager};
pub use service::{WatchConfig, WatchService};
pub use types::{AccessKind, Address, StackTrace, WatchRequest, WatchTarget};

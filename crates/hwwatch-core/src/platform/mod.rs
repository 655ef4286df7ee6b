//! # Platform-Specific Backends
//!
//! Each platform has its own submodule implementing
//! [`InstallationBackend`](crate::backend::InstallationBackend) with that
//! platform's native watchpoint API:
//!
//! - **Linux**: `perf_event_open(2)` with `PERF_TYPE_BREAKPOINT`
//!   - See: [perf_event_open(2) man page](https://man7.org/linux/man-pages/man2/perf_event_open.2.html)
//!
//! Other platforms only have the simulated backend.

#[cfg(target_os = "linux")]
pub mod linux;

//! # Linux perf Backend
//!
//! Hardware watchpoints through `perf_event_open(2)`.
//!
//! Each watch resource is one `PERF_TYPE_BREAKPOINT` event per online CPU
//! (system-wide, or restricted to one process with [`PerfConfig::pid`]). The
//! kernel writes a sample (IP, pid/tid, time, address, CPU, call chain) to an
//! mmap ring per event; a poller thread per resource drains the rings and calls
//! the handler. That poller thread is the trigger context.
//!
//! ## Modules
//!
//! - `ffi`: `perf_event_attr` layout and constants
//! - `cpus`: online CPU list parsing
//! - `ring`: the mmap'd sample ring
//! - `sample`: decoding `PERF_RECORD_SAMPLE` records
//! - `backend`: [`PerfBackend`] and its handle
//!
//! ## Permissions
//!
//! System-wide events need `CAP_PERFMON` (or `CAP_SYS_ADMIN`) or a permissive
//! `/proc/sys/kernel/perf_event_paranoid`. A refused open surfaces as
//! `EACCES`/`EPERM` in the install error.

mod backend;
pub mod cpus;
mod ffi;
mod ring;
mod sample;

pub use backend::{PerfBackend, PerfConfig, PerfHandle};

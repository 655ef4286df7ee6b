//! # Types
//!
//! Backend-agnostic types shared by the manager, dispatcher, and backends.
//!
//! These types keep "an address", "which access", and "what was on the stack"
//! distinct from raw integers so that the manager never has to know whether it
//! is talking to perf events or the simulated register pool.

pub mod access;
pub mod address;
pub mod stack;

// Re-export all public types
pub use access::{AccessKind, WatchRequest, WATCH_WIDTH};
pub use address::{Address, WatchTarget};
pub use stack::{StackTrace, MAX_STACK_FRAMES};

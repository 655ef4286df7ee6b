//! Common module for library exports

pub use crate::backend::simulated::SimulatedBackend;
pub use crate::backend::{InstallationBackend, RawAccess, TriggerHandler};
pub use crate::endpoint::ConfigEndpoint;
pub use crate::error::{EndpointError, HwWatchError, HwWatchResult, InstallError, ParseError};
pub use crate::events::{event_channel, ChannelSink, ObservabilitySink, TracingSink, TriggerEvent};
#[cfg(target_os = "linux")]
pub use crate::platform::linux::{PerfBackend, PerfConfig};
pub use crate::service::{WatchConfig, WatchService};
pub use crate::types::{AccessKind, Address, StackTrace, WatchTarget};

//! # Configuration Endpoint
//!
//! Operator-facing get/set surface for the watched address.
//!
//! The endpoint is transport-agnostic: the binary drives it from stdin, but a
//! parameter file or a socket would call the same two methods.
//!
//! The reported address is whatever the manager actually has armed. An
//! address is only "current" after a fully successful `configure`; a request
//! that failed to install reads back as `0x0`, and [`ConfigEndpoint::status_line`]
//! says which address was requested and why it is not being watched.

use std::sync::Arc;

use crate::backend::InstallationBackend;
use crate::error::EndpointError;
use crate::manager::{WatchStatus, WatchpointManager};
use crate::parse::parse_address;

/// Get/set access to a [`WatchpointManager`].
pub struct ConfigEndpoint<B: InstallationBackend>
{
    manager: Arc<WatchpointManager<B>>,
}

impl<B: InstallationBackend> Clone for ConfigEndpoint<B>
{
    fn clone(&self) -> Self
    {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<B: InstallationBackend> ConfigEndpoint<B>
{
    /// Endpoint delegating to `manager`.
    pub fn new(manager: Arc<WatchpointManager<B>>) -> Self
    {
        Self { manager }
    }

    /// Current address as `0x<hex>\n`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use hwwatch_core::backend::simulated::SimulatedBackend;
    /// use hwwatch_core::events::TracingSink;
    /// use hwwatch_core::{ConfigEndpoint, TriggerDispatcher, WatchpointManager};
    ///
    /// let dispatcher = TriggerDispatcher::new(Arc::new(TracingSink));
    /// let manager = Arc::new(WatchpointManager::new(SimulatedBackend::new(), dispatcher));
    /// let endpoint = ConfigEndpoint::new(manager);
    /// endpoint.set("0x1000\n").unwrap();
    /// assert_eq!(endpoint.get(), "0x1000\n");
    /// ```
    pub fn get(&self) -> String
    {
        format!("{:#x}\n", self.manager.target())
    }

    /// Parse `raw` and reconfigure the watch.
    ///
    /// ## Errors
    ///
    /// - [`EndpointError::Parse`]: malformed input, nothing changed
    /// - [`EndpointError::Install`]: the address was accepted but could not be
    ///   armed; the watch is now disabled
    pub fn set(&self, raw: &str) -> Result<(), EndpointError>
    {
        let address = parse_address(raw)?;
        self.manager.configure(address)?;
        Ok(())
    }

    /// One-line description of the manager state.
    pub fn status_line(&self) -> String
    {
        match self.manager.status() {
            WatchStatus::Disabled => "disabled".to_string(),
            WatchStatus::Armed(address) => format!("armed {address:#x} (read+write)"),
            WatchStatus::Faulted { requested, error } => {
                format!("disabled: {requested:#x} requested but not armed ({error})")
            }
        }
    }

    /// Manager behind this endpoint.
    pub fn manager(&self) -> &Arc<WatchpointManager<B>>
    {
        &self.manager
    }
}

//! Seams to the host process
//!
//! The core never owns the host console and never parses configuration
//! files. The process embedding it implements these traits and passes them
//! in.

use crate::{ConnectionDescriptor, Result};

/// Synchronous console channel owned by the host
pub trait HostConsole: Send + Sync + 'static {
    /// Whether the host currently holds a live console connection
    fn is_rcon_running(&self) -> bool;

    /// Run `command` and block until the console answers
    ///
    /// Only ever called from the offload worker, one call at a time.
    fn rcon_query(&self, command: &str) -> anyhow::Result<Option<String>>;

    /// Ask the host to re-establish its console connection
    ///
    /// Called from async context while a query may still be in flight, so
    /// it must only trigger the reconnect and return promptly.
    fn reconnect(&self);
}

/// Configuration lookups the startup path needs from the host
pub trait ConfigHooks: Send + Sync {
    /// Whether the game server has its remote console enabled at all
    fn check_rcon_enabled(&self) -> Result<bool>;

    /// Descriptor read from the game server's own properties, if any
    fn read_descriptor_from_properties(&self) -> Result<Option<ConnectionDescriptor>>;
}

//! Core library for rconbridge
//!
//! Runs remote console commands against a game server through one of two
//! interchangeable backends: the host process's own synchronous console
//! connection, or a standalone client that speaks the wire protocol itself.
//! Both answer with the same [`QueryOutcome`].

pub mod embedded;
pub mod error;
pub mod events;
pub mod host;
pub mod offload;
pub mod outcome;
pub mod probe;
pub mod protocol;
pub mod selector;
pub mod standalone;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports
pub use embedded::EmbeddedBackend;
pub use error::{Error, ErrorKind, Result};
pub use events::{EventKind, EventSink, Events, LogEvent, RecordingSink, TracingSink};
pub use host::{ConfigHooks, HostConsole};
pub use offload::{BlockingCallOffloader, PendingCall};
pub use outcome::{normalize, QueryOutcome};
pub use probe::{ConnectionProbe, ProbeReport};
pub use selector::{ContextStatus, RconContext, RefusalCause, StartupOptions};
pub use standalone::StandaloneBackend;
pub use transport::{Connector, RconSession, TcpConnector};
pub use types::{ActiveBackend, ConnectionDescriptor, ConnectionState, DEFAULT_RCON_PORT};

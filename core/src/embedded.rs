//! Queries through the host-owned console

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::events::{emit, EventKind, Events};
use crate::host::HostConsole;
use crate::offload::BlockingCallOffloader;
use crate::outcome::{normalize, QueryOutcome};
use crate::{Error, ErrorKind, Result};

/// First wait on a submitted query
pub const DEFAULT_FIRST_WAIT: Duration = Duration::from_millis(500);

/// Second wait on the same query, after asking the host to reconnect
pub const DEFAULT_ESCALATED_WAIT: Duration = Duration::from_millis(1000);

/// Backend answering queries through the host's synchronous console
pub struct EmbeddedBackend {
    console: Arc<dyn HostConsole>,
    offloader: BlockingCallOffloader,
    events: Events,
    first_wait: Duration,
    escalated_wait: Duration,
}

impl EmbeddedBackend {
    /// Create a backend with its own offload worker
    pub fn new(console: Arc<dyn HostConsole>, events: Events) -> Result<Self> {
        Ok(Self {
            console,
            offloader: BlockingCallOffloader::new("rcon-embedded")?,
            events,
            first_wait: DEFAULT_FIRST_WAIT,
            escalated_wait: DEFAULT_ESCALATED_WAIT,
        })
    }

    /// Override the two wait windows
    pub fn with_timeouts(mut self, first_wait: Duration, escalated_wait: Duration) -> Self {
        self.first_wait = first_wait;
        self.escalated_wait = escalated_wait;
        self
    }

    /// Whether the host console is usable right now
    pub fn is_available(&self) -> bool {
        self.console.is_rcon_running()
    }

    /// Run `command` on the host console
    ///
    /// A query that misses the first window is not resubmitted: the host is
    /// told to reconnect and the original call is awaited once more.
    #[instrument(skip(self))]
    pub async fn query(&self, command: &str) -> QueryOutcome {
        if !self.console.is_rcon_running() {
            return QueryOutcome::Error(Error::BackendDown(
                "host console is not connected".into(),
            ));
        }

        let console = Arc::clone(&self.console);
        let owned = command.to_string();
        let mut pending = match self.offloader.submit(move || console.rcon_query(&owned)) {
            Ok(pending) => pending,
            Err(e) => return self.unexpected(e),
        };

        let raw = match pending.wait_for(self.first_wait).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::Timeout => {
                warn!(
                    command = %command,
                    "Console query timed out, asking host to reconnect"
                );
                emit(
                    self.events.as_ref(),
                    EventKind::TimeoutWarning,
                    format!("query '{}' timed out, reconnecting host console", command),
                );
                self.console.reconnect();

                match pending.wait_for(self.escalated_wait).await {
                    Ok(raw) => raw,
                    Err(e) if e.kind() == ErrorKind::Timeout => {
                        warn!(command = %command, "Console still unresponsive after reconnect");
                        return QueryOutcome::Error(Error::Timeout(format!(
                            "no response to '{}' after reconnecting",
                            command
                        )));
                    }
                    Err(e) => return self.unexpected(e),
                }
            }
            Err(e) => return self.unexpected(e),
        };

        match raw {
            Ok(text) => {
                debug!(command = %command, "Console query answered");
                normalize(text)
            }
            Err(e) => self.unexpected(Error::from(e)),
        }
    }

    fn unexpected(&self, err: Error) -> QueryOutcome {
        emit(self.events.as_ref(), EventKind::UnexpectedError, err.to_string());
        QueryOutcome::Error(match err {
            Error::Unexpected(msg) => Error::Unexpected(msg),
            other => Error::Unexpected(other.to_string()),
        })
    }
}

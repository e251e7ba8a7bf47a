//! Persistent client owned by this process

use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::events::{emit, EventKind, Events};
use crate::outcome::{normalize, QueryOutcome};
use crate::protocol::{is_connection_reset, leaves_stream_unsynced};
use crate::transport::{Connector, RconSession};
use crate::{ConnectionDescriptor, ConnectionState, Error, ErrorKind, Result};

struct Inner {
    state: ConnectionState,
    descriptor: Option<ConnectionDescriptor>,
    session: Option<Box<dyn RconSession>>,
}

/// Backend holding its own console connection
///
/// Every operation runs under one async lock, so a reconnect triggered by a
/// reset is never raced by a second one from a concurrent command.
pub struct StandaloneBackend {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    events: Events,
}

impl StandaloneBackend {
    pub fn new(connector: Arc<dyn Connector>, events: Events) -> Self {
        Self {
            connector,
            inner: Mutex::new(Inner {
                state: ConnectionState::Unopened,
                descriptor: None,
                session: None,
            }),
            events,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Descriptor of the current or most recent connection
    pub async fn descriptor(&self) -> Option<ConnectionDescriptor> {
        self.inner.lock().await.descriptor.clone()
    }

    /// Connect and log in; a no-op while already open
    #[instrument(skip(self, descriptor), fields(addr = %descriptor.address()))]
    pub async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Open {
            debug!("Standalone client already open");
            return Ok(());
        }
        self.connect_locked(&mut inner, descriptor).await
    }

    /// Terminate the connection; a no-op unless open
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Open {
            return;
        }
        if let Some(mut session) = inner.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Error while closing console connection");
            }
        }
        inner.state = ConnectionState::Closed;

        let addr = inner
            .descriptor
            .as_ref()
            .map(|d| d.address())
            .unwrap_or_default();
        emit(
            self.events.as_ref(),
            EventKind::ClientClosed,
            format!("Standalone rcon client closed ({})", addr),
        );
    }

    /// Run `command` on the open connection
    ///
    /// A reset connection is reopened and the command resent exactly once.
    /// A connection left mid-frame by a failed exchange is dropped; the next
    /// command reopens it the same way.
    #[instrument(skip(self))]
    pub async fn command(&self, command: &str) -> QueryOutcome {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Open {
            return QueryOutcome::Error(Error::NotInitialized(format!(
                "standalone rcon client is {}",
                inner.state
            )));
        }

        let first = match inner.session.as_mut() {
            Some(session) => session.command(command).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection dropped after a failed exchange",
            )),
        };

        let err = match first {
            Ok(reply) => return normalize(Some(reply)),
            Err(e) if is_connection_reset(&e) => e,
            Err(e) => return self.failed(&mut inner, command, e),
        };

        warn!(error = %err, "Console connection reset, reconnecting once");
        inner.session = None;
        inner.state = ConnectionState::Unopened;

        let descriptor = match inner.descriptor.clone() {
            Some(d) => d,
            None => return QueryOutcome::Error(Error::unexpected(err)),
        };
        if let Err(e) = self.connect_locked(&mut inner, &descriptor).await {
            return QueryOutcome::Error(e);
        }

        let retry = match inner.session.as_mut() {
            Some(session) => session.command(command).await,
            None => return QueryOutcome::Error(Error::unexpected(err)),
        };
        match retry {
            Ok(reply) => normalize(Some(reply)),
            Err(e) => self.failed(&mut inner, command, e),
        }
    }

    async fn connect_locked(
        &self,
        inner: &mut Inner,
        descriptor: &ConnectionDescriptor,
    ) -> Result<()> {
        match self.connector.connect(descriptor).await {
            Ok(session) => {
                inner.session = Some(session);
                inner.descriptor = Some(descriptor.clone());
                inner.state = ConnectionState::Open;
                info!(addr = %descriptor.address(), "Standalone rcon client initialized");
                emit(
                    self.events.as_ref(),
                    EventKind::ClientInitialized,
                    format!("Standalone rcon client initialized ({})", descriptor.address()),
                );
                Ok(())
            }
            Err(e) => {
                // Never leave a half-open handle behind.
                inner.session = None;
                inner.state = ConnectionState::Unopened;
                let kind = match e.kind() {
                    ErrorKind::ConnectionRefused => EventKind::ConnectionRefused,
                    ErrorKind::AuthenticationFailed => EventKind::AuthFailed,
                    _ => EventKind::UnexpectedError,
                };
                emit(self.events.as_ref(), kind, e.to_string());
                Err(e)
            }
        }
    }

    fn failed(&self, inner: &mut Inner, command: &str, err: io::Error) -> QueryOutcome {
        if leaves_stream_unsynced(&err) {
            debug!("Dropping console connection after a failed exchange");
            inner.session = None;
        }
        let err = Error::Unexpected(format!("command '{}' failed: {}", command, err));
        emit(self.events.as_ref(), EventKind::UnexpectedError, err.to_string());
        QueryOutcome::Error(err)
    }
}

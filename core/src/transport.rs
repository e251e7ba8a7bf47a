//! Network transport for the standalone backend

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::protocol;
use crate::{ConnectionDescriptor, Error, Result};

/// How long establishing the TCP connection may take
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a single login or command exchange may take
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated console connection
#[async_trait]
pub trait RconSession: Send {
    /// Run `command` and return the raw reply
    async fn command(&mut self, command: &str) -> io::Result<String>;

    /// Terminate the connection
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens authenticated sessions
///
/// Fails with [`Error::ConnectionRefused`] when the endpoint cannot be
/// reached and [`Error::AuthenticationFailed`] when the password is wrong.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn RconSession>>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            io_timeout: IO_TIMEOUT,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    #[instrument(skip(self), fields(addr = %descriptor.address()))]
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn RconSession>> {
        let addr = descriptor.address();

        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Err(_) => {
                return Err(Error::connection_refused(
                    &addr,
                    format!(
                        "connection timeout after {} seconds",
                        self.connect_timeout.as_secs()
                    ),
                ))
            }
            Ok(Err(e)) => return Err(Error::connection_refused(&addr, e.to_string())),
            Ok(Ok(stream)) => stream,
        };
        stream.set_nodelay(true).ok();

        let accepted = timeout(
            self.io_timeout,
            protocol::authenticate(&mut stream, 0, &descriptor.password),
        )
        .await
        .map_err(|_| Error::Unexpected(format!("login to {} timed out", addr)))?
        .map_err(|e| Error::Unexpected(format!("login to {} failed: {}", addr, e)))?;

        if !accepted {
            stream.shutdown().await.ok();
            return Err(Error::authentication_failed(addr));
        }

        debug!("Authenticated");
        Ok(Box::new(TcpSession {
            stream,
            next_id: 1,
            io_timeout: self.io_timeout,
        }))
    }
}

/// Authenticated TCP session
pub struct TcpSession {
    stream: TcpStream,
    next_id: i32,
    io_timeout: Duration,
}

#[async_trait]
impl RconSession for TcpSession {
    async fn command(&mut self, command: &str) -> io::Result<String> {
        let id = self.next_id;
        // Ids stay positive; -1 is reserved for auth failure.
        self.next_id = if self.next_id == i32::MAX { 1 } else { self.next_id + 1 };

        timeout(
            self.io_timeout,
            protocol::exchange(&mut self.stream, id, command),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply within {}ms", self.io_timeout.as_millis()),
            )
        })?
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

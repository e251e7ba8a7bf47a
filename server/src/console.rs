//! Blocking console connection owned by this process
//!
//! Plays the role of the host's built-in console: it is synchronous, it is
//! used from one thread at a time, and it knows how to recover its own
//! connection.

use anyhow::{anyhow, bail, Context, Result};
use rconbridge_core::protocol::{authenticate_blocking, exchange_blocking};
use rconbridge_core::{ConnectionDescriptor, HostConsole};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a down console tries to connect again
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

struct Connection {
    stream: TcpStream,
    next_id: i32,
}

/// Synchronous console client implementing [`HostConsole`]
pub struct SyncConsole {
    descriptor: ConnectionDescriptor,
    io_timeout: Duration,
    conn: Mutex<Option<Connection>>,
    // Second handle to the live socket so `reconnect` can break a blocked read.
    interrupt: Mutex<Option<TcpStream>>,
    running: AtomicBool,
}

impl SyncConsole {
    pub fn new(descriptor: ConnectionDescriptor, io_timeout: Duration) -> Self {
        Self {
            descriptor,
            io_timeout,
            conn: Mutex::new(None),
            interrupt: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Establish the initial connection
    pub fn connect(&self) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("console lock poisoned"))?;
        *conn = Some(self.open()?);
        Ok(())
    }

    /// Keep reconnecting in the background while the console is down
    ///
    /// The thread holds only a weak reference and exits once the console
    /// is dropped.
    pub fn spawn_watchdog(self: &Arc<Self>, interval: Duration) -> Result<thread::JoinHandle<()>> {
        let console: Weak<Self> = Arc::downgrade(self);
        thread::Builder::new()
            .name("host-console-watchdog".into())
            .spawn(move || loop {
                thread::sleep(interval);
                let Some(console) = console.upgrade() else {
                    return;
                };
                if console.is_rcon_running() {
                    continue;
                }
                match console.connect() {
                    Ok(()) => info!("Host console recovered"),
                    Err(e) => debug!(error = %format!("{:#}", e), "Host console still down"),
                }
            })
            .context("Failed to start host console watchdog")
    }

    fn open(&self) -> Result<Connection> {
        let addr = self.descriptor.address();
        let socket_addr = addr
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", addr))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}", addr))?;

        let mut stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;

        if !authenticate_blocking(&mut stream, 0, &self.descriptor.password)
            .with_context(|| format!("Login to {} failed", addr))?
        {
            self.running.store(false, Ordering::SeqCst);
            bail!("Console at {} rejected the password", addr);
        }

        if let Ok(mut interrupt) = self.interrupt.lock() {
            *interrupt = stream.try_clone().ok();
        }
        self.running.store(true, Ordering::SeqCst);
        info!(addr = %addr, "Host console connected");

        Ok(Connection { stream, next_id: 1 })
    }

    fn send(conn: &mut Connection, command: &str) -> std::io::Result<String> {
        let id = conn.next_id;
        conn.next_id = if conn.next_id == i32::MAX { 1 } else { conn.next_id + 1 };
        exchange_blocking(&mut conn.stream, id, command)
    }
}

impl HostConsole for SyncConsole {
    fn is_rcon_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn rcon_query(&self, command: &str) -> Result<Option<String>> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("console lock poisoned"))?;

        if let Some(conn) = guard.as_mut() {
            match Self::send(conn, command) {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) => warn!(error = %e, "Host console query failed, reconnecting"),
            }
        }

        // One reconnect and resend; the caller sees the second failure.
        *guard = None;
        let conn = match self.open() {
            Ok(conn) => guard.insert(conn),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let reply = Self::send(conn, command).map_err(|e| {
            self.running.store(false, Ordering::SeqCst);
            anyhow!("Host console query '{}' failed after reconnect: {}", command, e)
        })?;
        Ok(Some(reply))
    }

    fn reconnect(&self) {
        // Fails any blocked read at once; `rcon_query` then reconnects itself.
        // The handle stays in place; `open` replaces it with the new socket.
        if let Ok(interrupt) = self.interrupt.lock() {
            if let Some(stream) = interrupt.as_ref() {
                debug!("Interrupting host console connection");
                stream.shutdown(Shutdown::Both).ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rconbridge_core::protocol::{
        read_packet_blocking, write_packet_blocking, Packet, AUTH_FAILED_ID,
        TYPE_AUTH_RESPONSE, TYPE_EXEC_COMMAND, TYPE_RESPONSE_VALUE,
    };
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Serve clients in turn; `stall_first` leaves the first client's first
    /// command unanswered until the socket dies.
    fn serve(listener: TcpListener, password: &'static str, stall_first: bool) -> Arc<AtomicUsize> {
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let login = match read_packet_blocking(&mut stream) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let id = if login.body == password { login.id } else { AUTH_FAILED_ID };
                let reply = Packet { id, kind: TYPE_AUTH_RESPONSE, body: String::new() };
                if write_packet_blocking(&mut stream, &reply).is_err() || id == AUTH_FAILED_ID {
                    continue;
                }
                while let Ok(request) = read_packet_blocking(&mut stream) {
                    if stall_first && index == 0 {
                        // Hold the request until the client gives up on us.
                        while read_packet_blocking(&mut stream).is_ok() {}
                        break;
                    }
                    let body = if request.kind == TYPE_EXEC_COMMAND {
                        format!("ok: {}", request.body)
                    } else {
                        format!("Unknown request {:x}", request.kind)
                    };
                    let reply = Packet { id: request.id, kind: TYPE_RESPONSE_VALUE, body };
                    if write_packet_blocking(&mut stream, &reply).is_err() {
                        break;
                    }
                }
            }
        });

        accepted
    }

    fn spawn_server(password: &'static str, stall_first: bool) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (port, serve(listener, password, stall_first))
    }

    fn console(port: u16, password: &str, io_timeout: Duration) -> SyncConsole {
        SyncConsole::new(
            ConnectionDescriptor::new("127.0.0.1", port, password).unwrap(),
            io_timeout,
        )
    }

    #[test]
    fn test_query_roundtrip() {
        let (port, _) = spawn_server("pw", false);
        let console = console(port, "pw", Duration::from_secs(2));

        assert!(!console.is_rcon_running());
        console.connect().unwrap();
        assert!(console.is_rcon_running());
        assert_eq!(console.rcon_query("list").unwrap(), Some("ok: list".into()));
    }

    #[test]
    fn test_wrong_password() {
        let (port, _) = spawn_server("pw", false);
        let console = console(port, "nope", Duration::from_secs(2));
        let err = console.connect().unwrap_err();
        assert!(err.to_string().contains("rejected the password"));
        assert!(!console.is_rcon_running());
    }

    #[test]
    fn test_reconnect_unblocks_inflight_query() {
        let (port, accepted) = spawn_server("pw", true);
        let console = Arc::new(console(port, "pw", Duration::from_secs(30)));
        console.connect().unwrap();

        let worker = {
            let console = console.clone();
            thread::spawn(move || console.rcon_query("list"))
        };
        thread::sleep(Duration::from_millis(100));
        console.reconnect();

        let reply = worker.join().unwrap().unwrap();
        assert_eq!(reply, Some("ok: list".into()));
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_idle_reconnect_keeps_interrupt_handle() {
        let (port, _) = spawn_server("pw", false);
        let console = console(port, "pw", Duration::from_secs(2));
        console.connect().unwrap();

        console.reconnect();
        assert!(console.interrupt.lock().unwrap().is_some());

        // The interrupted socket is replaced on the next query.
        assert_eq!(console.rcon_query("list").unwrap(), Some("ok: list".into()));
        assert!(console.interrupt.lock().unwrap().is_some());
    }

    #[test]
    fn test_watchdog_recovers_after_server_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let console = Arc::new(console(port, "pw", Duration::from_secs(2)));
        assert!(console.connect().is_err());
        assert!(console.rcon_query("list").is_err());
        assert!(!console.is_rcon_running());

        console.spawn_watchdog(Duration::from_millis(50)).unwrap();
        serve(TcpListener::bind(("127.0.0.1", port)).unwrap(), "pw", false);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !console.is_rcon_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(console.is_rcon_running());
        assert_eq!(console.rcon_query("list").unwrap(), Some("ok: list".into()));
    }
}

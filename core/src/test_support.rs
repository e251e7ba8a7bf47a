//! In-memory fakes for the host console and the network connector

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::host::{ConfigHooks, HostConsole};
use crate::transport::{Connector, RconSession};
use crate::{ConnectionDescriptor, Error, Result};

pub fn descriptor(host: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new(host, 25575, "pw").unwrap()
}

enum Answer {
    Text(String),
    Echo,
    Fail(String),
}

pub struct FakeConsole {
    answer: Answer,
    delay: Duration,
    running: AtomicBool,
    reconnects: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl FakeConsole {
    fn with_answer(answer: Answer) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            running: AtomicBool::new(true),
            reconnects: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::with_answer(Answer::Text(text.to_string()))
    }

    pub fn echoing() -> Self {
        Self::with_answer(Answer::Echo)
    }

    pub fn failing(msg: &str) -> Self {
        Self::with_answer(Answer::Fail(msg.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl HostConsole for FakeConsole {
    fn is_rcon_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn rcon_query(&self, command: &str) -> anyhow::Result<Option<String>> {
        self.commands.lock().unwrap().push(command.to_string());
        thread::sleep(self.delay);
        match &self.answer {
            Answer::Text(text) => Ok(Some(text.clone())),
            Answer::Echo => Ok(Some(command.to_string())),
            Answer::Fail(msg) => Err(anyhow::anyhow!("{}", msg)),
        }
    }

    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Accept,
    Refuse,
    RejectPassword,
}

pub enum Reply {
    Text(String),
    Reset,
    /// Times out, leaving the stream mid-frame
    Fail,
    /// Refused before anything was sent
    Rejected,
}

#[derive(Default)]
struct ConnectorState {
    behavior: HashMap<String, Behavior>,
    attempted: Vec<String>,
    script: VecDeque<Reply>,
    commands: Vec<String>,
}

/// Connector whose outcome is chosen per host name
///
/// Unknown hosts accept. Sessions pop replies from a shared script and
/// echo the command once it runs dry.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, host: &str, behavior: Behavior) {
        self.state
            .lock()
            .unwrap()
            .behavior
            .insert(host.to_string(), behavior);
    }

    pub fn refusing(self, host: &str) -> Self {
        self.refuse(host);
        self
    }

    pub fn rejecting(self, host: &str) -> Self {
        self.reject_password(host);
        self
    }

    pub fn refuse(&self, host: &str) {
        self.set(host, Behavior::Refuse);
    }

    pub fn reject_password(&self, host: &str) {
        self.set(host, Behavior::RejectPassword);
    }

    pub fn allow(&self, host: &str) {
        self.set(host, Behavior::Accept);
    }

    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.state.lock().unwrap().script.extend(replies);
    }

    /// Number of connect attempts, successful or not
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().attempted.len()
    }

    /// Hosts tried, in order
    pub fn attempted(&self) -> Vec<String> {
        self.state.lock().unwrap().attempted.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn RconSession>> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.attempted.push(descriptor.host.clone());
            state
                .behavior
                .get(&descriptor.host)
                .copied()
                .unwrap_or(Behavior::Accept)
        };
        // Let other tasks interleave like a real handshake would.
        tokio::task::yield_now().await;
        match behavior {
            Behavior::Accept => Ok(Box::new(FakeSession {
                state: self.state.clone(),
            })),
            Behavior::Refuse => Err(Error::connection_refused(
                descriptor.address(),
                "Connection refused (os error 111)",
            )),
            Behavior::RejectPassword => Err(Error::authentication_failed(descriptor.address())),
        }
    }
}

struct FakeSession {
    state: Arc<Mutex<ConnectorState>>,
}

#[async_trait]
impl RconSession for FakeSession {
    async fn command(&mut self, command: &str) -> io::Result<String> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command.to_string());
            state.script.pop_front()
        };
        tokio::task::yield_now().await;
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Reset) => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            Some(Reply::Fail) => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
            Some(Reply::Rejected) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "command too long",
            )),
            None => Ok(command.to_string()),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Config hooks returning fixed answers
pub struct FakeHooks {
    enabled: Result<bool>,
    properties: Option<ConnectionDescriptor>,
    checks: AtomicUsize,
}

impl FakeHooks {
    pub fn new(enabled: Result<bool>, properties: Option<ConnectionDescriptor>) -> Self {
        Self {
            enabled,
            properties,
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of `check_rcon_enabled` calls
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl ConfigHooks for FakeHooks {
    fn check_rcon_enabled(&self) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.enabled.clone()
    }

    fn read_descriptor_from_properties(&self) -> Result<Option<ConnectionDescriptor>> {
        Ok(self.properties.clone())
    }
}

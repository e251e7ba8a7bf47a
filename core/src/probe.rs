//! Credential probing after an authentication failure

use tracing::{info, warn};

use crate::standalone::StandaloneBackend;
use crate::{ConnectionDescriptor, Error, ErrorKind};

/// How a probe ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReport {
    /// This candidate logged in and is now the backend's connection
    Connected(ConnectionDescriptor),
    /// Every candidate was rejected as a wrong password
    Exhausted { tried: usize },
    /// A candidate failed for a reason other than its password
    Aborted(Error),
}

impl ProbeReport {
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeReport::Connected(_))
    }
}

/// Tries alternate descriptors in order against a standalone backend
pub struct ConnectionProbe<'a> {
    backend: &'a StandaloneBackend,
}

impl<'a> ConnectionProbe<'a> {
    pub fn new(backend: &'a StandaloneBackend) -> Self {
        Self { backend }
    }

    /// Open each candidate in turn until one authenticates
    ///
    /// A rejected password moves on to the next candidate. Any other failure
    /// means the server itself is unreachable, so probing stops there.
    pub async fn run<I>(&self, candidates: I) -> ProbeReport
    where
        I: IntoIterator<Item = ConnectionDescriptor>,
    {
        if let Some(current) = self.current().await {
            return ProbeReport::Connected(current);
        }

        let mut tried = 0;
        for candidate in candidates {
            tried += 1;
            info!(addr = %candidate.address(), "Trying alternate rcon credentials");
            match self.backend.open(&candidate).await {
                Ok(()) => {
                    info!(addr = %candidate.address(), "Alternate rcon credentials accepted");
                    return ProbeReport::Connected(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AuthenticationFailed => continue,
                Err(e) => {
                    warn!(error = %e, "Stopped probing, server is not reachable");
                    return ProbeReport::Aborted(e);
                }
            }
        }

        warn!(tried, "No valid rcon connection found");
        ProbeReport::Exhausted { tried }
    }

    async fn current(&self) -> Option<ConnectionDescriptor> {
        if self.backend.is_open().await {
            self.backend.descriptor().await
        } else {
            None
        }
    }
}

/// Drop `excluded` and repeated entries, keeping first-seen order
pub fn dedup_candidates(
    candidates: impl IntoIterator<Item = ConnectionDescriptor>,
    excluded: &ConnectionDescriptor,
) -> Vec<ConnectionDescriptor> {
    let mut unique: Vec<ConnectionDescriptor> = Vec::new();
    for candidate in candidates {
        if &candidate != excluded && !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

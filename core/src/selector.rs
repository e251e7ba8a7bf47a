//! Backend selection and the administrative surface
//!
//! [`RconContext`] is built once by the process's composition root and
//! shared by reference with every caller. It owns both backends, decides at
//! startup which one answers queries, and never changes that decision
//! afterwards.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};

use crate::embedded::EmbeddedBackend;
use crate::events::Events;
use crate::host::ConfigHooks;
use crate::outcome::QueryOutcome;
use crate::probe::{dedup_candidates, ConnectionProbe, ProbeReport};
use crate::standalone::StandaloneBackend;
use crate::transport::Connector;
use crate::{ActiveBackend, ConnectionDescriptor, ConnectionState, Error, ErrorKind, Result};

/// Inputs to the startup decision, resolved from configuration
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Skip the host console entirely
    pub standalone_only: bool,
    /// Descriptor the standalone backend opens first
    pub descriptor: ConnectionDescriptor,
    /// Alternates tried, in order, if `descriptor` is rejected
    pub candidates: Vec<ConnectionDescriptor>,
    /// Append the server properties descriptor to `candidates`
    pub include_properties: bool,
}

impl StartupOptions {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            standalone_only: false,
            descriptor,
            candidates: Vec::new(),
            include_properties: true,
        }
    }
}

/// Why the standalone client was refused at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "cause", content = "detail")]
pub enum RefusalCause {
    /// `enable-rcon` is off in the server properties
    RconDisabled,
    /// Rcon is enabled but nothing answered; the server is likely down
    NotListening,
    /// The properties could not be checked
    Unchecked(String),
}

impl fmt::Display for RefusalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefusalCause::RconDisabled => write!(f, "enable-rcon is false in server.properties"),
            RefusalCause::NotListening => {
                write!(f, "rcon is enabled but nothing is listening, is the server running?")
            }
            RefusalCause::Unchecked(reason) => {
                write!(f, "rcon settings could not be checked: {}", reason)
            }
        }
    }
}

/// Point-in-time view for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub active: Option<ActiveBackend>,
    pub embedded_available: bool,
    pub standalone_state: ConnectionState,
    pub standalone_addr: Option<String>,
    /// Set when the startup connection was refused
    pub refusal: Option<RefusalCause>,
}

/// Process-wide console access
pub struct RconContext {
    embedded: Option<EmbeddedBackend>,
    standalone: StandaloneBackend,
    hooks: Option<Arc<dyn ConfigHooks>>,
    active: OnceCell<ActiveBackend>,
    refusal: OnceLock<RefusalCause>,
}

impl RconContext {
    /// Create a context with only the standalone backend
    pub fn new(connector: Arc<dyn Connector>, events: Events) -> Self {
        Self {
            embedded: None,
            standalone: StandaloneBackend::new(connector, events),
            hooks: None,
            active: OnceCell::new(),
            refusal: OnceLock::new(),
        }
    }

    /// Make the host console available as a backend
    pub fn with_embedded(mut self, embedded: EmbeddedBackend) -> Self {
        self.embedded = Some(embedded);
        self
    }

    /// Provide configuration lookups for probing and diagnosis
    pub fn with_hooks(mut self, hooks: Arc<dyn ConfigHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Selected backend, once startup has run
    pub fn active(&self) -> Option<ActiveBackend> {
        self.active.get().copied()
    }

    pub fn standalone(&self) -> &StandaloneBackend {
        &self.standalone
    }

    /// Choose the backend and, for standalone, try to connect
    ///
    /// Connection problems are logged rather than returned: the choice is
    /// made either way and later queries report the failure. Only a second
    /// call is an error.
    #[instrument(skip(self, options), fields(standalone_only = options.standalone_only))]
    pub async fn startup(&self, options: &StartupOptions) -> Result<ActiveBackend> {
        if self.active.initialized() {
            return Err(Error::ConfigError("rcon backend is already selected".into()));
        }

        let choice = if options.standalone_only {
            info!("Standalone client requested, skipping host console");
            ActiveBackend::Standalone
        } else if self.embedded.as_ref().is_some_and(|e| e.is_available()) {
            info!("Using the host console for rcon queries");
            ActiveBackend::Embedded
        } else {
            info!("Host console unavailable, falling back to standalone client");
            ActiveBackend::Standalone
        };

        self.active
            .set(choice)
            .map_err(|_| Error::ConfigError("rcon backend is already selected".into()))?;

        if choice == ActiveBackend::Standalone {
            self.connect_standalone(options).await;
        }
        Ok(choice)
    }

    /// Answer `command` through the selected backend
    pub async fn query(&self, command: &str) -> QueryOutcome {
        match self.active() {
            Some(ActiveBackend::Embedded) => match &self.embedded {
                Some(embedded) => embedded.query(command).await,
                None => QueryOutcome::Error(Error::BackendDown(
                    "no host console is configured".into(),
                )),
            },
            Some(ActiveBackend::Standalone) => self.standalone.command(command).await,
            None => QueryOutcome::Error(Error::NotInitialized(
                "rcon backend has not been selected yet".into(),
            )),
        }
    }

    /// Administrative open of the standalone client
    ///
    /// Does not change which backend answers queries.
    pub async fn open_standalone(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        self.standalone.open(descriptor).await
    }

    /// Administrative close of the standalone client
    pub async fn close_standalone(&self) {
        self.standalone.close().await
    }

    /// Release the standalone connection on process exit
    pub async fn shutdown(&self) {
        if self.standalone.is_open().await {
            self.standalone.close().await;
        }
    }

    pub async fn status(&self) -> ContextStatus {
        ContextStatus {
            active: self.active(),
            embedded_available: self.embedded.as_ref().is_some_and(|e| e.is_available()),
            standalone_state: self.standalone.state().await,
            standalone_addr: self.standalone.descriptor().await.map(|d| d.address()),
            refusal: self.refusal.get().cloned(),
        }
    }

    /// Diagnosis of a refused startup connection
    pub fn refusal(&self) -> Option<&RefusalCause> {
        self.refusal.get()
    }

    async fn connect_standalone(&self, options: &StartupOptions) {
        let err = match self.standalone.open(&options.descriptor).await {
            Ok(()) => return,
            Err(e) => e,
        };

        match err.kind() {
            ErrorKind::AuthenticationFailed => {
                let report = self.probe(options).await;
                match report {
                    ProbeReport::Connected(d) => {
                        info!(addr = %d.address(), "Connected with alternate credentials")
                    }
                    ProbeReport::Exhausted { tried } => error!(
                        tried,
                        "No valid rcon connection found, check the configured password"
                    ),
                    ProbeReport::Aborted(e) if e.kind() == ErrorKind::ConnectionRefused => {
                        self.diagnose_refusal(&e)
                    }
                    ProbeReport::Aborted(e) => error!(error = %e, "Rcon probing aborted"),
                }
            }
            ErrorKind::ConnectionRefused => self.diagnose_refusal(&err),
            _ => error!(error = %err, "Failed to initialize standalone rcon client"),
        }
    }

    async fn probe(&self, options: &StartupOptions) -> ProbeReport {
        let mut candidates = options.candidates.clone();
        if options.include_properties {
            if let Some(hooks) = &self.hooks {
                match hooks.read_descriptor_from_properties() {
                    Ok(Some(d)) => candidates.push(d),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Could not read rcon settings from properties"),
                }
            }
        }
        let candidates = dedup_candidates(candidates, &options.descriptor);
        ConnectionProbe::new(&self.standalone).run(candidates).await
    }

    fn diagnose_refusal(&self, err: &Error) {
        let cause = match self.hooks.as_ref().map(|hooks| hooks.check_rcon_enabled()) {
            Some(Ok(false)) => RefusalCause::RconDisabled,
            Some(Ok(true)) => RefusalCause::NotListening,
            Some(Err(e)) => RefusalCause::Unchecked(e.to_string()),
            None => RefusalCause::Unchecked("no configuration hooks".into()),
        };
        error!(error = %err, "Rcon connection refused: {}", cause);
        // Startup runs once, so this is the only write.
        self.refusal.set(cause).ok();
    }
}

//! Application state

use rconbridge_core::{
    ActiveBackend, EmbeddedBackend, QueryOutcome, RconContext, Result, StartupOptions,
    TcpConnector, TracingSink,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::{render, Command, HELP};
use crate::config::Config;
use crate::console::{SyncConsole, RETRY_INTERVAL};
use crate::properties::PropertiesFile;

/// What the caller should do after a command
pub enum Reply {
    Text(String),
    /// A console query; kept as an outcome so one-shot mode can pick an exit code
    Outcome(QueryOutcome),
    Quit,
}

/// Shared application state
///
/// Cloning is cheap; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rcon: Arc<RconContext>,
}

impl AppState {
    /// Build the backends described by `config`
    pub async fn new(config: Config) -> Result<Self> {
        let events = Arc::new(TracingSink);
        let connector = Arc::new(TcpConnector::new().with_io_timeout(config.timeouts.io()));
        let hooks = Arc::new(PropertiesFile::new(config.properties_path()));

        let mut rcon = RconContext::new(connector, events.clone()).with_hooks(hooks);

        if config.host.enabled && !config.standalone_only {
            let console = Arc::new(SyncConsole::new(
                config.host.rcon.clone(),
                config.timeouts.io(),
            ));

            // Connecting blocks; keep it off the runtime threads.
            let connecting = console.clone();
            match tokio::task::spawn_blocking(move || connecting.connect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %format!("{:#}", e), "Host console not connected"),
                Err(e) => warn!(error = %e, "Host console connect task failed"),
            }
            console.spawn_watchdog(RETRY_INTERVAL)?;

            let embedded = EmbeddedBackend::new(console, events)?.with_timeouts(
                config.timeouts.embedded_first(),
                config.timeouts.embedded_escalated(),
            );
            rcon = rcon.with_embedded(embedded);
        }

        Ok(Self {
            config: Arc::new(config),
            rcon: Arc::new(rcon),
        })
    }

    /// Select the backend from configuration
    pub async fn startup(&self) -> Result<ActiveBackend> {
        let options = StartupOptions {
            standalone_only: self.config.standalone_only,
            descriptor: self.config.primary_descriptor(),
            candidates: self.config.fallback_candidates(),
            include_properties: !self.config.ignore.server_properties,
        };
        let active = self.rcon.startup(&options).await?;
        info!(backend = %active, "Rcon backend selected");
        Ok(active)
    }

    /// Run one parsed command
    pub async fn handle(&self, command: Command, json: bool) -> Reply {
        match command {
            Command::Query(cmd) => Reply::Outcome(self.rcon.query(&cmd).await),
            Command::Open => {
                let descriptor = self.config.primary_descriptor();
                let text = match self.rcon.open_standalone(&descriptor).await {
                    Ok(()) => format!("Standalone client open ({})", descriptor.address()),
                    Err(e) => render(&QueryOutcome::Error(e), json),
                };
                Reply::Text(text)
            }
            Command::Close => {
                self.rcon.close_standalone().await;
                Reply::Text("Standalone client closed".to_string())
            }
            Command::Status => {
                let status = self.rcon.status().await;
                let text = if json {
                    serde_json::to_string(&status).unwrap_or_default()
                } else {
                    let mut text = format!(
                        "backend: {}\nhost console: {}\nstandalone client: {}{}",
                        status
                            .active
                            .map(|a| a.to_string())
                            .unwrap_or_else(|| "none".to_string()),
                        if status.embedded_available { "connected" } else { "down" },
                        status.standalone_state,
                        status
                            .standalone_addr
                            .map(|a| format!(" ({})", a))
                            .unwrap_or_default(),
                    );
                    if let Some(cause) = status.refusal {
                        text.push_str(&format!("\nstartup refused: {}", cause));
                    }
                    text
                };
                Reply::Text(text)
            }
            Command::Help => Reply::Text(HELP.to_string()),
            Command::Quit => Reply::Quit,
        }
    }

    /// Release connections before exit
    pub async fn shutdown(&self) {
        info!("Shutting down rcon clients");
        self.rcon.shutdown().await;
    }
}

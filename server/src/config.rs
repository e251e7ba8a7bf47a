//! Configuration management

use rconbridge_core::{ConnectionDescriptor, Error, Result, DEFAULT_RCON_PORT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Never use the host console, always the standalone client
    pub standalone_only: bool,

    /// Game server working directory (holds `server.properties`)
    pub server_dir: String,

    /// Connection info from this tool's own config
    pub rcon: ConnectionDescriptor,

    /// Host console settings
    pub host: HostConfig,

    /// Descriptor sources to skip
    pub ignore: IgnoreOptions,

    /// Wait windows and socket timeouts
    pub timeouts: Timeouts,
}

/// Host-owned console connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Whether the host keeps its own console connection
    pub enabled: bool,
    #[serde(flatten)]
    pub rcon: ConnectionDescriptor,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rcon: ConnectionDescriptor::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreOptions {
    pub host_config: bool,
    pub server_properties: bool,
    pub plugin_config: bool,
}

impl Default for IgnoreOptions {
    fn default() -> Self {
        Self {
            host_config: false,
            server_properties: false,
            plugin_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub embedded_first_ms: u64,
    pub embedded_escalated_ms: u64,
    pub io_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedded_first_ms: 500,
            embedded_escalated_ms: 1000,
            io_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn embedded_first(&self) -> Duration {
        Duration::from_millis(self.embedded_first_ms)
    }

    pub fn embedded_escalated(&self) -> Duration {
        Duration::from_millis(self.embedded_escalated_ms)
    }

    pub fn io(&self) -> Duration {
        Duration::from_secs(self.io_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            standalone_only: false,
            server_dir: "server".to_string(),
            rcon: ConnectionDescriptor::default(),
            host: HostConfig::default(),
            ignore: IgnoreOptions::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = if let Some(p) = path {
            Self::load_from_file(p)?
        } else {
            Self::load_from_env()?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from configuration file
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    ///
    /// `RCON_*` describe the host console; `PLUGIN_RCON_*` the tool's own
    /// descriptor.
    fn load_from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("SERVER_DIR") {
            config.server_dir = dir;
        }
        if let Ok(value) = std::env::var("RCON_STANDALONE_ONLY") {
            config.standalone_only = parse_bool("RCON_STANDALONE_ONLY", &value)?;
        }

        config.host.rcon = descriptor_from_env("RCON", &config.host.rcon)?;
        config.rcon = descriptor_from_env("PLUGIN_RCON", &config.rcon)?;
        if std::env::var("PLUGIN_RCON_HOST").is_ok() || get_secret("PLUGIN_RCON_PASSWORD").is_some()
        {
            config.ignore.plugin_config = false;
        }

        Ok(config)
    }

    /// Reject descriptors that can never connect
    pub fn validate(&self) -> Result<()> {
        self.rcon.validate()?;
        self.host.rcon.validate()
    }

    /// Path of the game server's `server.properties`
    pub fn properties_path(&self) -> PathBuf {
        PathBuf::from(&self.server_dir).join("server.properties")
    }

    fn config_sources(&self) -> Vec<&ConnectionDescriptor> {
        let mut sources = Vec::new();
        if !self.ignore.host_config {
            sources.push(&self.host.rcon);
        }
        if !self.ignore.plugin_config {
            sources.push(&self.rcon);
        }
        sources
    }

    /// Descriptor the standalone client opens first
    pub fn primary_descriptor(&self) -> ConnectionDescriptor {
        self.config_sources()
            .first()
            .map(|d| (*d).clone())
            .unwrap_or_else(|| self.host.rcon.clone())
    }

    /// Alternates probed when the primary descriptor is rejected
    pub fn fallback_candidates(&self) -> Vec<ConnectionDescriptor> {
        self.config_sources()
            .into_iter()
            .skip(1)
            .cloned()
            .collect()
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            var, other
        ))),
    }
}

fn descriptor_from_env(prefix: &str, base: &ConnectionDescriptor) -> Result<ConnectionDescriptor> {
    let host = std::env::var(format!("{}_HOST", prefix)).unwrap_or_else(|_| base.host.clone());
    let port = match std::env::var(format!("{}_PORT", prefix)) {
        Ok(raw) => parse_port(&raw)?,
        Err(_) => base.port,
    };
    let password =
        get_secret(&format!("{}_PASSWORD", prefix)).unwrap_or_else(|| base.password.clone());
    ConnectionDescriptor::new(host, port, password)
}

/// Parse a port number, rejecting 0 and anything above 65535
pub fn parse_port(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::ConfigError(format!(
            "Invalid RCON port '{}', expected 1-65535 (default {})",
            raw.trim(),
            DEFAULT_RCON_PORT
        ))),
        Ok(port) => Ok(port),
    }
}

/// Get secret from environment variable or file
///
/// Supports both direct environment variables and file-based secrets (Docker/Kubernetes pattern).
/// If `VAR_NAME` is not found, tries `VAR_NAME_FILE` which should point to a file containing the secret.
pub fn get_secret(var_name: &str) -> Option<String> {
    // Try environment variable first
    if let Ok(value) = std::env::var(var_name) {
        return Some(value);
    }

    // Try file-based secret (Docker secrets / Kubernetes)
    let file_var = format!("{}_FILE", var_name);
    if let Ok(path) = std::env::var(&file_var) {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            return Some(contents.trim().to_string());
        }
    }

    None
}

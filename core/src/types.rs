//! Shared types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Default remote console port
pub const DEFAULT_RCON_PORT: u16 = 25575;

/// Where and how to reach a remote console endpoint
///
/// Produced by configuration resolution and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConnectionDescriptor {
    /// Create a validated descriptor
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Result<Self> {
        let descriptor = Self {
            host: host.into(),
            port,
            password: password.into(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reject descriptors that can never connect
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::ConfigError("RCON host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::ConfigError(
                "RCON port must be between 1 and 65535".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` form used for connecting and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RCON_PORT,
            password: "password".to_string(),
        }
    }
}

// Passwords end up in logs through `?descriptor`; never print them.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &mask_password(&self.password))
            .finish()
    }
}

/// Mask a password for display, keeping only its first and last character
pub fn mask_password(password: &str) -> String {
    let chars: Vec<char> = password.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        format!("{}***{}", chars[0], chars[chars.len() - 1])
    }
}

/// Lifecycle of a standalone connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unopened => f.write_str("unopened"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

/// Which backend answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveBackend {
    Embedded,
    Standalone,
}

impl fmt::Display for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveBackend::Embedded => f.write_str("embedded"),
            ActiveBackend::Standalone => f.write_str("standalone"),
        }
    }
}

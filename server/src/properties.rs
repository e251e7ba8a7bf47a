//! `server.properties` lookups for the startup path

use rconbridge_core::{ConfigHooks, ConnectionDescriptor, Error, Result, DEFAULT_RCON_PORT};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::config::parse_port;

/// The game server's properties file, read fresh on every lookup
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
}

impl PropertiesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(parse_properties(&content))
    }
}

impl ConfigHooks for PropertiesFile {
    fn check_rcon_enabled(&self) -> Result<bool> {
        let props = self.load()?;
        Ok(is_true(props.get("enable-rcon")))
    }

    fn read_descriptor_from_properties(&self) -> Result<Option<ConnectionDescriptor>> {
        let props = self.load()?;
        if !is_true(props.get("enable-rcon")) {
            debug!(path = %self.path.display(), "Rcon disabled in properties");
            return Ok(None);
        }

        let password = match props.get("rcon.password") {
            Some(p) if !p.is_empty() => p.clone(),
            _ => return Ok(None),
        };
        let port = match props.get("rcon.port") {
            Some(raw) if !raw.is_empty() => parse_port(raw)?,
            _ => DEFAULT_RCON_PORT,
        };
        let host = match props.get("server-ip") {
            Some(ip) if !ip.is_empty() => ip.clone(),
            _ => "127.0.0.1".to_string(),
        };

        ConnectionDescriptor::new(host, port, password).map(Some)
    }
}

fn is_true(value: Option<&String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parse Java properties syntax
///
/// Handles `#`/`!` comments, `=` or `:` separators and backslash escapes.
/// Line continuations are not supported; game servers never write them.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in content.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut key = String::new();
        let mut chars = line.chars();
        let mut escaped = false;
        for c in chars.by_ref() {
            if escaped {
                key.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '=' || c == ':' {
                break;
            } else {
                key.push(c);
            }
        }

        let value = unescape(chars.as_str().trim());
        props.insert(key.trim().to_string(), value);
    }
    props
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

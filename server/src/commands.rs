//! Operator command layer

use rconbridge_core::QueryOutcome;

/// Prefix accepted in front of console commands
pub const COMMAND_PREFIX: &str = "!!rcon";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Forward to the game server console
    Query(String),
    /// Open the standalone client with the configured descriptor
    Open,
    /// Close the standalone client
    Close,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse an input line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        // With the prefix, everything after it goes to the console verbatim.
        if let Some(rest) = line.strip_prefix(COMMAND_PREFIX) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let rest = rest.trim();
                return if rest.is_empty() {
                    Some(Command::Help)
                } else {
                    Some(Command::Query(rest.to_string()))
                };
            }
        }

        let command = match line {
            "open" => Command::Open,
            "close" => Command::Close,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Query(other.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
Commands:
  <command>          run a console command (e.g. `list`)
  !!rcon <command>   same, for commands named like the ones below
  open               open the standalone client
  close              close the standalone client
  status             show which backend answers queries
  help               show this help
  quit               exit";

/// Render an outcome for the operator
pub fn render(outcome: &QueryOutcome, json: bool) -> String {
    if json {
        serde_json::to_string(outcome).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    } else {
        outcome.render()
    }
}

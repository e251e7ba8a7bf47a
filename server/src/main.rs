//! rconbridge
//!
//! Runs remote console commands against a game server, either through a
//! console connection this process keeps open or through a standalone
//! client.

use clap::Parser;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, instrument};

mod commands;
mod config;
mod console;
mod properties;
mod state;

use commands::{render, Command};
use config::Config;
use state::{AppState, Reply};

/// Remote console bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "RCONBRIDGE_CONFIG")]
    config: Option<String>,

    /// Use the standalone client even if the host console is available
    #[arg(long)]
    standalone_only: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Run this single command and exit instead of reading stdin
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
#[instrument]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rconbridge=debug".into()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if args.standalone_only {
        config.standalone_only = true;
    }
    info!(server_dir = %config.server_dir, "Starting rconbridge");

    let state = AppState::new(config).await?;
    state.startup().await?;

    let code = if args.command.is_empty() {
        run_interactive(&state, args.json).await?;
        ExitCode::SUCCESS
    } else {
        run_once(&state, &args.command.join(" "), args.json).await
    };

    state.shutdown().await;
    Ok(code)
}

/// One-shot mode; fails the process when the query fails
async fn run_once(state: &AppState, line: &str, json: bool) -> ExitCode {
    let Some(command) = Command::parse(line) else {
        return ExitCode::SUCCESS;
    };
    match state.handle(command, json).await {
        Reply::Outcome(outcome) => {
            println!("{}", render(&outcome, json));
            if outcome.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Reply::Text(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Reply::Quit => ExitCode::SUCCESS,
    }
}

/// Read commands from stdin until `quit`, EOF or Ctrl-C
async fn run_interactive(state: &AppState, json: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        let text = match state.handle(command, json).await {
            Reply::Outcome(outcome) => render(&outcome, json),
            Reply::Text(text) => text,
            Reply::Quit => break,
        };
        stdout.write_all(text.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    Ok(())
}

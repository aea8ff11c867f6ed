//! Command-line front end.
//!
//! | Command | Flow | Exit codes |
//! |---------|------|------------|
//! | `read` | connect → join → extract → print | 0 ok, 3 fatal |
//! | `write <FILE\|->` | convert → connect → join → `save_config` | 0 all, 1 some, 2 none accepted, 3 fatal |
//! | `convert <FILE\|->` | convert → print | 0 all, 1 some, 2 none accepted |
//!
//! Data goes to stdout; diagnostics and logs go to stderr.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use mcp_live_sync::session::config::{DEFAULT_PAGE_PATH, DEFAULT_SOCKET_PATH};
use mcp_live_sync::{
    ConfigConverter, Conversion, Error, Outcome, ProcessEnv, ProtocolSession, Result,
    SessionConfig, extract_config,
};

// ============================================================================
// Exit Codes
// ============================================================================

const EXIT_OK: u8 = 0;
const EXIT_PARTIAL: u8 = 1;
const EXIT_NONE_ACCEPTED: u8 = 2;
const EXIT_FATAL: u8 = 3;

// ============================================================================
// Arguments
// ============================================================================

/// Read and write MCP server configuration over a LiveView channel.
#[derive(Debug, Parser)]
#[command(name = "mcp-live-sync", version, about)]
struct Cli {
    /// Host base URL, e.g. https://app.example.com.
    #[arg(long, env = "MCP_LIVE_SYNC_HOST", global = true)]
    host: Option<String>,

    /// Session cookie header value.
    #[arg(long, env = "MCP_LIVE_SYNC_COOKIE", hide_env_values = true, global = true)]
    cookie: Option<String>,

    /// Path of the page hosting the LiveView.
    #[arg(long, default_value = DEFAULT_PAGE_PATH, global = true)]
    page: String,

    /// Path of the LiveView socket.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH, global = true)]
    socket: String,

    /// Verbose diagnostics on stderr.
    #[arg(
        long,
        env = "MCP_LIVE_SYNC_DEBUG",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current MCP configuration as JSON.
    Read,

    /// Convert a configuration file and upload it.
    Write {
        /// Input file, or `-` for stdin.
        input: PathBuf,

        /// Convert and report without connecting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Convert a configuration file and print the result.
    Convert {
        /// Input file, or `-` for stdin.
        input: PathBuf,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match &cli.command {
        Command::Read => run_read(&cli).await,
        Command::Write { input, dry_run } => run_write(&cli, input, *dry_run).await,
        Command::Convert { input } => run_convert(input).await,
    };

    ExitCode::from(code)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(debug: bool) {
    let filter = if debug {
        "mcp_live_sync=debug"
    } else {
        "mcp_live_sync=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// Commands
// ============================================================================

async fn run_read(cli: &Cli) -> u8 {
    let result = async {
        let mut session = open_session(cli).await?;
        let response = session.join().await;
        session.close().await;

        let config = extract_config(&response?)?;
        Ok::<_, Error>(serde_json::to_string_pretty(&config)?)
    }
    .await;

    match result {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("error: {e}");
            error_code(&e)
        }
    }
}

async fn run_write(cli: &Cli, input: &Path, dry_run: bool) -> u8 {
    let conversion = match load_and_convert(input).await {
        Ok(conversion) => conversion,
        Err(e) => {
            eprintln!("error: {e}");
            return error_code(&e);
        }
    };

    report(&conversion);
    let code = outcome_code(conversion.outcome());

    if dry_run {
        return print_config(&conversion).map_or(EXIT_FATAL, |()| code);
    }

    if conversion.outcome() == Outcome::NoneAccepted {
        eprintln!("nothing to upload");
        return code;
    }

    let result = async {
        let document = conversion.config.to_value()?;
        let mut session = open_session(cli).await?;

        let saved = match session.join().await {
            Ok(_) => session.save_config(&document).await.map(|_| ()),
            Err(e) => Err(e),
        };
        session.close().await;
        saved
    }
    .await;

    match result {
        Ok(()) => {
            eprintln!("uploaded {} server(s)", conversion.config.servers.len());
            code
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_FATAL
        }
    }
}

async fn run_convert(input: &Path) -> u8 {
    match load_and_convert(input).await {
        Ok(conversion) => {
            report(&conversion);
            let code = outcome_code(conversion.outcome());
            print_config(&conversion).map_or(EXIT_FATAL, |()| code)
        }
        Err(e) => {
            eprintln!("error: {e}");
            error_code(&e)
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn open_session(cli: &Cli) -> Result<ProtocolSession> {
    let host = cli
        .host
        .as_deref()
        .ok_or_else(|| Error::config("No host; pass --host or set MCP_LIVE_SYNC_HOST"))?;
    let cookie = cli
        .cookie
        .as_deref()
        .ok_or_else(|| {
            Error::config("No session cookie; pass --cookie or set MCP_LIVE_SYNC_COOKIE")
        })?;

    let config = SessionConfig::builder()
        .base_url(host)
        .page_path(&cli.page)
        .socket_path(&cli.socket)
        .build()?;

    let mut session = ProtocolSession::new(config, cookie)?;
    if let Err(e) = session.connect().await {
        session.close().await;
        return Err(e);
    }

    debug!(?session, "Session connected");
    Ok(session)
}

async fn load_and_convert(input: &Path) -> Result<Conversion> {
    let read = if input.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .map(|_| text)
    } else {
        tokio::fs::read_to_string(input).await
    };
    let text = read.map_err(|e| {
        Error::invalid_input(format!("Cannot read {}: {e}", input.display()))
    })?;

    let source: Value = serde_json::from_str(&text).map_err(|e| {
        Error::invalid_input(format!("{} is not valid JSON: {e}", input.display()))
    })?;

    ConfigConverter::new(ProcessEnv).convert(&source)
}

fn report(conversion: &Conversion) {
    for name in conversion.accepted() {
        eprintln!("accepted: {name}");
    }
    for rejection in &conversion.rejected {
        eprintln!(
            "rejected: {}: {} (suggestion: {})",
            rejection.name, rejection.reason, rejection.suggestion
        );
    }
    for warning in &conversion.warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_config(conversion: &Conversion) -> Result<()> {
    let json = serde_json::to_string_pretty(&conversion.config.to_value()?)?;
    println!("{json}");
    Ok(())
}

fn outcome_code(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::AllAccepted => EXIT_OK,
        Outcome::Partial => EXIT_PARTIAL,
        Outcome::NoneAccepted => EXIT_NONE_ACCEPTED,
    }
}

fn error_code(err: &Error) -> u8 {
    if err.is_fatal() {
        error!(error = %err, "Fatal error");
        EXIT_FATAL
    } else {
        EXIT_NONE_ACCEPTED
    }
}

// ============================================================================
// Tests
// ============================================================================

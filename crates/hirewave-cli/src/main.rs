//! HireWave CLI - sign in to the HireWave job board and browse it from the terminal.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hirewave_core::{ApiClient, AuthSession, Config, TokenStore};

/// Log file name inside the data directory
const LOG_FILE: &str = "hirewave.log";

const USAGE: &str = "\
Usage: hirewave <command> [args]

Commands:
  login [--otp] [email]         Sign in with a password or an emailed code
  register [email]              Create an account and sign in with the emailed code
  logout                        Sign out here and on the server
  whoami [--json]               Show the signed-in user
  status                        Show session and storage status
  flags [list [filter]]         List feature flags
  flags set <flag> <on|off>     Override a flag (development mode only)
  flags reset                   Drop all flag overrides
  jobs [page]                   List job postings
  blog [page]                   List blog posts and categories";

/// Commands that read the signed-in session and so need the startup check.
/// The rest must work offline or with a token the backend no longer accepts.
fn needs_session_check(command: &str) -> bool {
    matches!(command, "login" | "whoami" | "status" | "jobs" | "blog")
}

/// Initialize the tracing subscriber: stderr plus a log file in `data_dir`.
/// The returned guard must be held until exit so buffered lines are flushed.
fn init_tracing(data_dir: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let (file_layer, guard) = match std::fs::create_dir_all(data_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    let _log_guard = init_tracing(&data_dir);
    info!(command, api = %config.api_base_url, "HireWave CLI starting");

    let tokens = TokenStore::with_default_backends(&data_dir);
    let api = ApiClient::from_config(&config, tokens)?;
    let session = AuthSession::new(api);
    if needs_session_check(command) {
        session.initialize().await;
    }

    let rest = &args[1..];
    match command {
        "login" => commands::login(&session, config, rest).await,
        "register" => commands::register(&session, config, rest).await,
        "logout" => commands::logout(&session).await,
        "whoami" => commands::whoami(&session, rest),
        "status" => commands::status(&session, &config, &data_dir),
        "flags" => commands::flags(&config, rest),
        "jobs" => commands::jobs(&session, rest).await,
        "blog" => commands::blog(&session, rest).await,
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

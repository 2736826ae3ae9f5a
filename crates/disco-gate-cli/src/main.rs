//! disco-gate - drive the Disco session gate from the command line.
//!
//! Navigations run through the same gate the web app uses, against the
//! configured credential store and backend, so a session can be inspected
//! and renewed without a browser.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use disco_gate_core::{
    ApiClient, Config, CredentialBackend, CredentialName, CredentialStore, Decision, FileStore,
    KeyringStore, MemoryStore, NavigationOutcome, Navigator, Notice, SessionGate,
};

/// Log file prefix when logging to a directory
const LOG_FILE_PREFIX: &str = "disco-gate.log";

#[derive(Parser, Debug)]
#[command(name = "disco-gate", about = "Session gate for the Disco web app", version)]
struct Cli {
    /// Config file (defaults to ~/.config/disco-gate/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Credential store: keyring, file or memory
    #[arg(long)]
    store: Option<CredentialBackend>,

    /// Backend base URL
    #[arg(long, env = "DISCO_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Navigate to each destination in turn, printing where each one lands
    Navigate {
        #[arg(required = true)]
        destinations: Vec<String>,
    },
    /// Store a credential, as the login page would after signing in
    SetToken {
        #[arg(value_parser = parse_credential_name)]
        name: CredentialName,
        value: String,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: i64,
    },
    /// Show which credentials are currently present
    Status,
    /// List the configured destinations
    Routes,
}

fn parse_credential_name(s: &str) -> Result<CredentialName, String> {
    CredentialName::from_name(s)
        .ok_or_else(|| format!("expected access_token or refresh_token, got '{}'", s))
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn open_store(backend: CredentialBackend, config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match backend {
        CredentialBackend::Keyring => Arc::new(KeyringStore::new()),
        CredentialBackend::File => Arc::new(FileStore::new(config.cache_dir()?)),
        CredentialBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

fn print_notices(notices: &mut tokio::sync::broadcast::Receiver<Notice>) {
    loop {
        match notices.try_recv() {
            Ok(notice) => eprintln!("! {}", notice.message),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env()?;
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url;
    }
    let backend = cli.store.unwrap_or(config.credential_backend);
    let store = open_store(backend, &config)?;
    info!(backend = %backend, api = %config.api_base_url, "disco-gate starting");

    match cli.command {
        Command::Navigate { destinations } => {
            let routes = config.routes()?;
            let client = ApiClient::with_timeout(&config.api_base_url, config.renewal_timeout())
                .context("Failed to create API client")?;
            let gate = SessionGate::new(store, client, config.gate_config());
            let mut notices = gate.subscribe();
            let navigator = Navigator::new(routes, gate);

            for name in destinations {
                let outcome = navigator.navigate(&name).await?;
                print_notices(&mut notices);
                match outcome {
                    NavigationOutcome::Committed {
                        destination,
                        decision: Decision::Allow,
                    } => println!("{} -> {}", name, destination.name),
                    NavigationOutcome::Committed { destination, .. } => {
                        println!("{} -> {} (redirected)", name, destination.name)
                    }
                    NavigationOutcome::Superseded => println!("{} -> superseded", name),
                }
            }
        }
        Command::SetToken { name, value, ttl } => {
            let lifetime = chrono::Duration::try_seconds(ttl)
                .with_context(|| format!("TTL of {}s is out of range", ttl))?;
            store
                .set(name, &value, lifetime)
                .with_context(|| format!("Failed to store {}", name))?;
            println!("Stored {} for {}s in {} store", name, ttl, backend);
        }
        Command::Status => {
            for name in CredentialName::ALL {
                let state = if store.get(name).is_some() { "present" } else { "absent" };
                println!("{:<14} {}", name.as_str(), state);
            }
        }
        Command::Routes => {
            for destination in config.routes()?.iter() {
                let gated = if destination.is_protected() { "requires auth" } else { "public" };
                println!("{:<14} {}", destination.name, gated);
            }
        }
    }

    Ok(())
}

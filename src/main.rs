/// dhaba client - main entry point
///
/// Interactive command-line client for the dhaba food-ordering backend:
/// sign-in, cart, and realtime support chat.
use anyhow::Context;
use clap::Parser;
use dhaba_client::api::ServerApi;
use dhaba_client::backend::HttpBackend;
use dhaba_client::cli;
use dhaba_client::client::AuthenticatedClient;
use dhaba_client::session::{SessionGate, SessionState};
use dhaba_client::storage::TokenStore;
use log::info;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dhaba")]
#[command(about = "Dhaba client - food ordering and support chat")]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    /// Config directory for the local database (default: ~/.dhaba)
    #[arg(long)]
    config: Option<String>,

    /// Enable verbose logging (DEBUG level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    info!("Starting dhaba client");
    info!("Server: {}", args.server);

    let config_dir = if let Some(config_path) = args.config {
        std::path::PathBuf::from(config_path)
    } else {
        use directories::BaseDirs;
        let base_dirs = BaseDirs::new().context("Failed to get home directory")?;
        base_dirs.home_dir().join(".dhaba")
    };
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    info!("Config directory: {}", config_dir.display());

    let store = Arc::new(TokenStore::new(config_dir.join("dhaba.db"))?);
    let backend = HttpBackend::new(&args.server)?;
    let client = Arc::new(AuthenticatedClient::new(backend, store));
    let gate = SessionGate::new(ServerApi::new(client));

    // Resolve any persisted session; a network failure here keeps the
    // tokens for a later retry and just starts signed out.
    match gate.resolve().await {
        Ok(SessionState::SignedIn(user)) => println!("welcome back, {}", user.username),
        Ok(_) => println!("not signed in; use /login <username>"),
        Err(e) => {
            log::warn!("Session resolve failed: {}", e);
            println!("could not reach server ({}); use /login once it is back", e);
        }
    }

    cli::run_loop(&gate, &args.server).await?;

    Ok(())
}

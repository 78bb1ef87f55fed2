//! # redcard
//!
//! Game server binary: loads settings, sets up logging and metrics, and runs
//! the HTTP/WebSocket server until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use redcard_game::Deck;
use redcard_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use redcard_server::{RedcardServer, ServerConfig};
use redcard_settings::RedcardSettings;

/// Multiplayer party card game server.
#[derive(Parser, Debug)]
#[command(name = "redcard", about = "Multiplayer party card game server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.redcard/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Card deck JSON file (overrides settings).
    #[arg(long)]
    deck: Option<PathBuf>,

    /// Disable the `/metrics` endpoint.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Fold CLI overrides into loaded settings.
    fn apply(&self, settings: &mut RedcardSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(deck) = &self.deck {
            settings.game.deck_path = Some(deck.to_string_lossy().into_owned());
        }
    }
}

fn load_deck(path: Option<&str>) -> Result<Deck> {
    match path {
        Some(path) => Deck::load(Path::new(path))
            .with_context(|| format!("Failed to load deck from {path}")),
        None => Ok(Deck::builtin()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(redcard_settings::settings_path);
    let mut settings = redcard_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    if settings.logging.json {
        redcard_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        redcard_core::logging::init_subscriber(&settings.logging.level);
    }

    let deck = load_deck(settings.game.deck_path.as_deref())?;
    tracing::info!(
        red = deck.red().len(),
        white = deck.white().len(),
        "deck loaded"
    );

    let metrics = if args.no_metrics {
        None
    } else {
        Some(
            redcard_server::metrics::install_recorder()
                .context("Failed to install metrics recorder")?,
        )
    };

    let config = ServerConfig::from(&settings.server);
    let server = RedcardServer::new(config, settings.game.clone(), deck, metrics);
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "redcard ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(DEFAULT_SHUTDOWN_TIMEOUT))
        .await;
    Ok(())
}

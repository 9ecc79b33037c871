// ABOUTME: Main entry point for the Twitch-director bridge service
// ABOUTME: Initializes logging, config, both connectors, and the control server

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twitch_bridge::bridge::Bridge;
use twitch_bridge::config::Config;
use twitch_bridge::director::DirectorConnector;
use twitch_bridge::server;
use twitch_bridge::twitch::TwitchConnector;

#[derive(Debug, Parser)]
#[command(name = "twitch-bridge", about = "Bridges Twitch chat and the director service")]
struct Cli {
    /// Path to the config file (overrides BRIDGE_CONFIG_PATH and ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Bridge crashed with the following error:         ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tungstenite=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Twitch bridge");

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;

    tracing::info!(
        director_url = %config.director.url,
        channel = %config.twitch.channel,
        bot_name = %config.twitch.bot_name,
        aliases = config.twitch.mention_aliases.len(),
        http_port = config.http.port,
        "Configuration loaded"
    );

    let director = DirectorConnector::new(config.director.url.clone());
    let twitch = TwitchConnector::new(config.twitch.clone());
    let bridge = Bridge::new(director, twitch.clone(), &config.twitch.mention_aliases)?;

    bridge.start().await?;

    // Control server runs in the background; the process lives until ctrl-c.
    let http_host = config.http.host.clone();
    let http_port = config.http.port;
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&http_host, http_port, twitch).await {
            tracing::error!(error = %e, "Control server failed");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    bridge.shutdown();

    Ok(())
}

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use ask_bridge::config::BridgeConfig;
use ask_bridge::handlers::AppState;
use ask_bridge::routes::configure_routes;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ask-bridge", version, about = "Ask humans structured questions through a remote UI")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// URL of the UI-hosting process; pass an empty string to disable forwarding
    #[arg(long, value_name = "URL")]
    peer: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ask_bridge=info,actix_web=info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Starting ask-bridge");

    let (mut config, config_path) = match &cli.config {
        Some(path) => (BridgeConfig::load_from_file(path)?, path.clone()),
        None => BridgeConfig::load()?,
    };
    tracing::info!("Loaded configuration from {}", config_path.display());

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(peer) = cli.peer {
        config.peer.url = Some(peer);
    }
    match config.peer.url() {
        Some(url) => tracing::info!("Forwarding surfaces to {url} when no UI is attached"),
        None => tracing::warn!("No peer configured; surfaces wait for a local UI connection"),
    }

    let app_state = web::Data::new(AppState::start(&config)?);
    let server_addr = config.bind_addr();
    tracing::info!("Starting HTTP server on {}", server_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    tracing::info!("ask-bridge stopped");
    Ok(())
}

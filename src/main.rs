use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use speech_bridge::{
    ServerConfig,
    core::speech::{CredentialProvider, SpeechConfig},
    routes,
    state::AppState,
};

/// Speech Bridge - streams call audio to a speech recognition service
#[derive(Parser, Debug)]
#[command(name = "speech-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the call bridge server
    Serve,

    /// Exchange the subscription key for a bearer token and report the result
    Token,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Token => check_token(&config).await,
        Commands::Serve => serve(config).await,
    }
}

async fn check_token(config: &ServerConfig) -> anyhow::Result<()> {
    let speech: SpeechConfig = config.speech_config().map_err(|e| anyhow!(e.to_string()))?;
    let provider = CredentialProvider::new(speech.token_url.clone(), speech.token_timeout)?;

    let token = provider.fetch_token(&config.subscription_key()).await?;
    println!(
        "Token issued by {} ({} bytes)",
        provider.token_url(),
        token.expose().len()
    );
    Ok(())
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;
    info!(
        "Call-control document will point at {}",
        app_state.config.public_ws_url()
    );

    let app = routes::create_app(app_state);

    let listener = TcpListener::bind(&socket_addr).await?;
    info!("Server listening on http://{}", socket_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

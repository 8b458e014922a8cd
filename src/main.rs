use std::sync::Arc;

use clap::Parser;
use secrecy::SecretString;

use relay_llm::GeminiBackend;
use relay_server::GatewayConfig;

/// Real-time session gateway bridging WebSocket clients to a
/// conversational backend.
#[derive(Parser, Debug)]
#[command(name = "relay", version)]
struct Cli {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Model backing the chat sessions.
    #[arg(long)]
    model: Option<String>,

    /// Backend API key, supplied via flag or environment.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting relay gateway");

    let backend = Arc::new(GeminiBackend::new(
        SecretString::from(cli.api_key),
        cli.model.as_deref(),
    ));

    let config = GatewayConfig {
        host: cli.host,
        port: cli.port,
        ..Default::default()
    };

    let handle = relay_server::start(config, backend)
        .await
        .expect("Failed to start gateway");

    tracing::info!(addr = %handle.addr, "Gateway ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

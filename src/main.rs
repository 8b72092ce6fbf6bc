//! CLI for TopicGate
//!
//! Runs the WebSocket server with settings from the given config file and
//! `TOPICGATE__*` environment variables.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use topicgate::auth::PasswordHasher;
use topicgate::config::load_config_from;
use topicgate::persistence::open_store;
use topicgate::transport::Handler;
use topicgate::transport::websocket::start_websocket_server;
use topicgate::utils::logging;

#[derive(Parser)]
#[command(name = "topicgate", about = "Authentication and topic ACL server")]
struct Cli {
    /// Base name of the config file, extension optional
    #[arg(long, default_value = "config/default")]
    config: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run_server(&cli.config).await {
        // Logging may not be up if configuration failed.
        eprintln!("Server failed: {e}");
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(config_file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_from(config_file)?;
    logging::init(&config.logging.level);

    let hasher = PasswordHasher::new(config.security.bcrypt_cost);
    let store = open_store(&config.storage, hasher).await?;
    if let Err(e) = store.load().await {
        warn!(error = %e, "Starting with an empty user collection");
    }

    let handler = Arc::new(Handler::new(store));
    let addr = format!("{}:{}", config.server.host, config.server.port);

    tokio::select! {
        served = start_websocket_server(&addr, handler) => {
            served?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

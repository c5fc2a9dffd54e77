//! Keyrotor HTTP server
//!
//! Starts an Axum web server that dispatches chat requests across the
//! configured credential and model pools.

use clap::Parser;
use keyrotor::{
    cli::{Cli, Command, generate_config_template},
    config::{API_KEYS_ENV, Config},
    handlers::{self, AppState},
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let mut config = Config::from_file(&cli.config)?;
    if let Ok(keys) = std::env::var(API_KEYS_ENV) {
        config.credentials.extend_from_list(&keys);
        config.validate()?;
    }

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        config_path = %cli.config,
        credential_count = config.credentials.len(),
        model_count = config.catalog().len(),
        upstream = %config.upstream.base_url,
        "Starting Keyrotor server on {}:{}",
        config.server.host,
        config.server.port
    );
    if config.credentials.is_empty() {
        tracing::warn!(
            "No credentials configured (set [credentials].keys or {}). \
            Every request will be answered by the fallback responder.",
            API_KEYS_ENV
        );
    }

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(Arc::new(config))?;
    let app = handlers::router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

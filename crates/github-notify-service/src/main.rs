//! # GitHub Notify Service
//!
//! Binary entry point for the GitHub Notify HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Creates the collaborator adapters and core pipeline
//! - Starts the HTTP server

use anyhow::Context;
use github_notify_service::{
    config::{LoggingConfig, ServiceConfig},
    errors::ServiceError,
    start_server, AppState,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration is read before logging starts so the configured filter
    // applies; a load failure is reported once logging is up.
    let loaded = ServiceConfig::load();

    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    init_tracing(&logging).context("failed to initialize logging")?;

    info!("Starting GitHub Notify Service");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    info!(
        host = %config.server.host,
        port = config.server.port,
        organizations = ?config.notify.organizations,
        signature_required = config.webhook.require_signature,
        "Configuration loaded"
    );

    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize service; aborting");
            std::process::exit(exit_code(&e));
        }
    };

    if let Err(e) = start_server(state).await {
        error!("Failed to start server: {}", e);
        std::process::exit(exit_code(&e));
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let fmt_layer = if logging.json_format {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

fn exit_code(error: &ServiceError) -> i32 {
    match error {
        ServiceError::BindFailed { .. } => 1,
        ServiceError::ServerFailed { .. } => 2,
        ServiceError::Configuration(_) => 3,
        ServiceError::Initialization { .. } => 4,
    }
}

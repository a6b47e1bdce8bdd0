//! nodeselector-webhook - assigns pod node selectors from namespace rules.
//!
//! This is the main entry point that:
//! - Parses command line flags
//! - Initializes structured logging
//! - Loads the namespace rules
//! - Starts the health server and the TLS webhook server
//! - Shuts down gracefully on SIGTERM/SIGINT

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use nodeselector_webhook::health::{HealthState, run_health_server};
use nodeselector_webhook::webhooks::{check_certificates, shutdown_webhook_server};
use nodeselector_webhook::{MutationContext, RuleConfig, WebhookState, run_webhook_server};

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Mutating admission webhook that injects pod node selectors per namespace
#[derive(Parser, Debug)]
#[command(name = "nodeselector-webhook", version, about, long_about = None)]
struct Cli {
    /// Directory containing the rules file
    #[arg(long, env = "WEBHOOK_CONFDIR", default_value = "/opt/config")]
    confdir: PathBuf,

    /// Rules file name
    #[arg(long, env = "WEBHOOK_CONF", default_value = "rules.json")]
    conf: PathBuf,

    /// Directory containing the TLS certificate and key
    #[arg(long, env = "WEBHOOK_TLSDIR", default_value = "/opt/certs")]
    tlsdir: PathBuf,

    /// TLS certificate file name
    #[arg(long, env = "WEBHOOK_CERT", default_value = "tls.crt")]
    cert: PathBuf,

    /// TLS private key file name
    #[arg(long, env = "WEBHOOK_KEY", default_value = "tls.key")]
    key: PathBuf,

    /// Webhook listen address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    /// Health and metrics listen address
    #[arg(long, env = "WEBHOOK_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Enable debug logging
    #[arg(long, env = "WEBHOOK_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("nodeselector_webhook={level}").parse()?),
        )
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting nodeselector-webhook");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let config_path = cli.confdir.join(&cli.conf);
    let cert_path = cli.tlsdir.join(&cli.cert);
    let key_path = cli.tlsdir.join(&cli.key);

    let config = RuleConfig::load(&config_path)?;
    let invalid = config.validate();
    if !invalid.is_empty() {
        warn!(
            count = invalid.len(),
            "Rules contain invalid selectors, matching pods will be denied"
        );
    }

    check_certificates(&cert_path, &key_path)?;

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness probes work during startup
    let health_handle = {
        let health_state = health_state.clone();
        let addr = cli.health_addr;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let webhook_state = Arc::new(WebhookState::new(
        MutationContext::new(config),
        Some(health_state.clone()),
    ));

    let server_handle = Handle::new();
    let mut webhook_handle = {
        let server_handle = server_handle.clone();
        let addr = cli.addr;
        tokio::spawn(async move {
            if let Err(e) =
                run_webhook_server(webhook_state, addr, &cert_path, &key_path, server_handle)
                    .await
            {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    let shutdown_requested = tokio::select! {
        result = &mut webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
            false
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            false
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => true,
    };

    if shutdown_requested {
        info!("Received shutdown signal, initiating graceful shutdown...");

        // Mark as not ready to stop receiving new requests
        health_state.set_ready(false).await;
        info!("Marked webhook as not ready");

        info!(
            "Waiting up to {}s for in-flight admission requests to complete...",
            SHUTDOWN_GRACE_PERIOD_SECS
        );
        shutdown_webhook_server(
            &server_handle,
            Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS),
        );
        if let Err(e) = webhook_handle.await {
            error!("Webhook server task panicked: {}", e);
        }

        info!("Grace period complete, shutting down");
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Loan BFF service
//!
//! Subscribes to the loan queue and logs received submissions; exposes
//! a health endpoint. No further processing happens here yet.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::signal;

use loan_bff::config::Config;
use loan_bff::consumer::LoanSubmittedConsumer;
use loan_contracts::LOAN_QUEUE;
use loan_messaging::BusConfig;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting loan BFF");

    // Initialize the message bus per the deployment profile
    let bus_config = match BusConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load messaging configuration: {}", e);
            std::process::exit(1);
        }
    };

    let bus = match loan_messaging::create_bus(&bus_config).await {
        Ok(bus) => bus,
        Err(e) => {
            tracing::error!("Failed to connect to message bus: {}", e);
            std::process::exit(1);
        }
    };

    let consumer = Arc::new(LoanSubmittedConsumer::new());
    if let Err(e) = bus.subscribe(LOAN_QUEUE, consumer).await {
        tracing::error!("Failed to subscribe to {}: {}", LOAN_QUEUE, e);
        std::process::exit(1);
    }

    tracing::info!(queue = %LOAN_QUEUE, "Consumer subscribed");

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Loan BFF listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Serve with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "Loan BFF Service"
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

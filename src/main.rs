// src/main.rs
use std::net::SocketAddr;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqlog::config::{Config, LogFormat, LoggingConfig};
use reqlog::{request_logger, Logger, RequestLogOptions, RequestLogger};

mod handlers;

use handlers::echo::echo;
use handlers::health::health_check;

/// Demo server with request logging in front of every route
#[derive(Debug, Parser)]
#[command(name = "reqlog", version, about)]
struct Args {
    /// Config file (without extension); defaults to config/default if present
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match cfg.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Main entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    init_tracing(&cfg.logging);
    tracing::info!(?cfg, "⚙️ Loaded configuration");

    let interceptor = RequestLogger::new(
        Logger::tracing(),
        RequestLogOptions::from(&cfg.request_log),
    )?;
    tracing::info!(header = %interceptor.header_name(), "✅ Request logging enabled");

    // Build application router
    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/echo", post(echo))
        .layer(
            // request logging outermost so the end record sees every response header
            ServiceBuilder::new()
                .layer(from_fn_with_state(interceptor, request_logger))
                .layer(CorsLayer::permissive()),
        );

    // Server address
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(%addr, "🌐 Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install terminate signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("⚡ Shutdown signal received");
}

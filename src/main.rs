mod models;
mod handlers;
mod routes;
mod docs;
mod config;
mod relay;
mod utils;

use std::{net::SocketAddr, panic, sync::Arc, time::Duration};

use config::Config;
use relay::{CloseMessage, RoomRegistry};
use routes::create_app;
use tokio::signal;
use tracing::{debug, info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "playback_sync=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if config.is_development() {
        debug!("Configuration: {:?}", config);
    }

    let registry = RoomRegistry::new(config.relay_config());
    let state = AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Rooms available at ws://{}/api/rooms/{{id}}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(registry, config.shutdown_timeout()))
        .await
        .expect("Server failed to start");

    info!("Server stopped");
}

/// Resolves on Ctrl-C or SIGTERM, after every room has been asked to close its sessions.
async fn shutdown_signal(registry: Arc<RoomRegistry>, timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received. Shutting down server...");
    let close = CloseMessage::going_away("Server is shutting down");
    if registry.shutdown(close, timeout).await {
        info!("All sessions closed");
    }
}

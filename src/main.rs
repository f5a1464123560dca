use std::net::SocketAddr;

use tracing::{error, info};

use auth_core::config::AppConfig;
use auth_core::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    auth_core::telemetry::init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {e}");
            return Err(e.into());
        }
    };

    let port = config.server.port;
    info!("connecting to database and building application state...");
    let state = AppState::connect(config).await.map_err(|e| {
        error!("failed to initialize application state: {e}");
        e
    })?;
    info!("application state ready");

    let app = auth_core::router::build(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Waits for SIGINT or SIGTERM (spec §5: "On SIGINT/SIGTERM ... the
/// server stops accepting new connections, waits up to ShutdownTimeout
/// for in-flight handlers, then closes pools"). `axum::serve`'s graceful
/// shutdown already drains in-flight connections before returning; pool
/// closing happens implicitly when `state`/`app` drop after this
/// function returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight requests");
}

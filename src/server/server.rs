//! Actix app assembly and the process lifecycle: bind, serve, and an
//! ordered shutdown on SIGINT/SIGTERM/SIGHUP (spec section 6).

use std::sync::Arc;

use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpServer as ActixHttpServer};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::server::middleware::RequestIdMiddleware;
use crate::server::routes;
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};

pub async fn run(state: AppState) -> Result<()> {
    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let workers = state.config.server.workers;
    let monitoring = Arc::clone(&state.monitoring);
    let data = web::Data::new(state);

    let http_server = ActixHttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(TracingLogger::default())
            .wrap(DefaultHeaders::new().add(("Server", "relaycrate")))
            .wrap(RequestIdMiddleware)
            .configure(routes::configure)
    })
    .workers(workers)
    .bind(&bind_addr)
    .map_err(|e| GatewayError::internal(format!("failed to bind {bind_addr}: {e}")))?
    .run();

    info!(%bind_addr, workers, "relaycrate gateway listening");

    let handle = http_server.handle();
    tokio::spawn(shutdown_signal(handle));

    let result = http_server.await;

    info!("http server stopped, flushing relay log ring");
    monitoring.flush().await?;

    result.map_err(GatewayError::Io)
}

/// Waits for SIGINT/SIGTERM/SIGHUP and stops accepting new connections,
/// letting in-flight requests drain before the server future resolves.
async fn shutdown_signal(handle: actix_web::dev::ServerHandle) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                handle.stop(true).await;
                return;
            }
        };
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGHUP handler");
                let _ = ctrl_c.await;
                handle.stop(true).await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
            _ = hangup.recv() => info!("received SIGHUP, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received ctrl-c, shutting down");
    }

    handle.stop(true).await;
}

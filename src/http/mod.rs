//! HTTP surface: axum routes over the user and note services.

mod cors;
mod error;
mod handlers;

pub use cors::{allowed_origins, build_cors_layer, reject_unlisted_origin};
pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::Config;
use crate::error::Result;
use crate::service::Services;

/// Routes without middleware.
pub fn router(services: Services) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/index", get(handlers::index))
        .route("/index.html", get(handlers::index))
        .route(
            "/users",
            get(handlers::list_users)
                .post(handlers::create_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/notes",
            get(handlers::list_notes)
                .post(handlers::create_note)
                .patch(handlers::update_note)
                .delete(handlers::delete_note),
        )
        .fallback(handlers::fallback)
        .with_state(services)
}

/// The full application: routes plus request tracing and CORS.
pub fn app(services: Services, config: &Config) -> Router {
    router(services)
        .layer(middleware::from_fn_with_state(
            Arc::new(allowed_origins(config)),
            reject_unlisted_origin,
        ))
        .layer(build_cors_layer(config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Serve until Ctrl-C.
pub async fn serve(services: Services, config: &Config) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, backend = %config.backend, "server running");

    axum::serve(listener, app(services, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

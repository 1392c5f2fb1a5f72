// ABOUTME: Backend HTTP service that fronts the inference provider
// ABOUTME: Router assembly, middleware and graceful shutdown

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/generate", post(routes::generate))
        .route("/status/{job_id}", get(routes::job_status))
        .route("/jobs", get(routes::list_jobs))
        .route("/jobs/{job_id}", delete(routes::delete_job))
        .route("/test-local", post(routes::test_local))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C, then stop every job poller.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let on_shutdown = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            on_shutdown.cancel_pollers().await;
        })
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

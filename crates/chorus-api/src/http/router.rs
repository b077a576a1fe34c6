//! Axum router configuration with middleware.
//!
//! All routes are under `/api/`; `/health` is public.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    let api_routes = Router::new()
        .route("/summarize", post(handlers::summarize::summarize))
        .route("/sessions", get(handlers::session::list_sessions))
        .route(
            "/sessions/{id}",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        );

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; an empty list allows any origin.
///
/// Preflight requests are answered by the layer and never reach the
/// authenticated handlers.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// GET /health - Liveness plus a database ping (no auth required).
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.db_pool.reader).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "health check database ping failed");
            "unavailable"
        }
    };

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
    }))
}

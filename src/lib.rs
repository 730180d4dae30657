pub mod content;
pub mod db;
pub mod models;
pub mod routes;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use sqlx::SqlitePool;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use routes::{auth_routes, categories_routes, posts_routes, tags_routes, visitors_routes};

/// Builds the full application router. Shared between the binary and the
/// integration tests so both exercise the same routing and middleware.
pub fn app(pool: SqlitePool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .nest("/api/v1/auth", auth_routes())
        .nest("/api/v1/posts", posts_routes())
        .nest("/api/v1/categories", categories_routes())
        .nest("/api/v1/tags", tags_routes())
        .nest("/api/v1/visitors", visitors_routes())
        .route("/api/v1/health", get(health_check));

    Router::new()
        .merge(api_routes)
        .nest_service("/uploads", ServeDir::new("uploads"))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({"detail": "Not found"})),
    )
}

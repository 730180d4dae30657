pub mod auth;
pub mod categories;
pub mod posts;
pub mod tags;
pub mod visitors;

use axum::{Json, http::StatusCode};

pub use auth::auth_routes;
pub use categories::categories_routes;
pub use posts::posts_routes;
pub use tags::tags_routes;
pub use visitors::visitors_routes;

pub(crate) fn internal_error<E: ToString>(error: E) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"detail": error.to_string()})),
    )
}

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use sqlx::SqlitePool;

use crate::models::{Tag, TagWithCount};
use crate::routes::auth::extract_current_user;
use crate::routes::internal_error;

pub fn tags_routes() -> Router<SqlitePool> {
    Router::new()
        .route("/", get(list_tags).post(create_tags))
        .route("/{tag_id}", axum::routing::delete(delete_tag))
}

async fn list_tags(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let tags = sqlx::query_as::<_, TagWithCount>(
        r#"SELECT t.id, t.name, COUNT(pt.post_id) AS post_count
           FROM tags t
           LEFT JOIN post_tags pt ON pt.tag_id = t.id
           GROUP BY t.id, t.name
           ORDER BY t.name"#,
    )
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(tags))
}

/// Batch create. The tags page submits every chip the author typed in one
/// request; names are normalized to lowercase, blanks and duplicates dropped.
async fn create_tags(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Json(names): Json<Vec<String>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let mut normalized: Vec<String> = Vec::new();
    for name in &names {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !normalized.contains(&name) {
            normalized.push(name);
        }
    }

    if normalized.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "At least one tag name is required"})),
        ));
    }

    for name in &normalized {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&pool)
            .await
            .map_err(internal_error)?;
    }

    let mut created = Vec::with_capacity(normalized.len());
    for name in &normalized {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&pool)
            .await
            .map_err(internal_error)?;
        created.push(tag);
    }

    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_tag(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(tag_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = ?")
        .bind(tag_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"detail": "Tag not found"})),
            )
        })?;

    let (in_use,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_tags WHERE tag_id = ?")
        .bind(tag.id)
        .fetch_one(&pool)
        .await
        .map_err(internal_error)?;

    if in_use > 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({"detail": "Cannot delete tag with existing posts"})),
        ));
    }

    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(tag.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(
        serde_json::json!({"message": "Tag deleted successfully"}),
    ))
}
